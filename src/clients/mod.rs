pub mod llm_client;

pub use llm_client::{with_retries, LlmClient, LlmSettings, TextGenerator, TextStream};
