pub mod toml_loader;

pub use toml_loader::{load_plan, parse_plan, GenerationPlan, SeedQuestion};
