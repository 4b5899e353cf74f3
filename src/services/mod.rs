pub mod apportion;
pub mod item_collector;
pub mod output_extractor;
pub mod prompt_builder;

pub use apportion::{apportion, LeafQuota};
pub use item_collector::{normalize_key, parse_item, ItemCollector, ParseStats};
pub use output_extractor::extract_json_array;
pub use prompt_builder::{build_user_prompt, PromptInput, SYSTEM_PROMPT};
