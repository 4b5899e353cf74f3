pub mod chapter;
pub mod job;
pub mod loaders;
pub mod question;
pub mod request;

pub use chapter::{Chapter, ChapterNode};
pub use job::{Event, EventKind, Job, JobStatus};
pub use loaders::{load_plan, GenerationPlan};
pub use question::{CollectedItem, NewQuestion, ReviewStatus, StoredQuestion};
pub use request::{ChapterWeight, GenerationRequest, GenerationRule, MAX_RULE_COUNT};
