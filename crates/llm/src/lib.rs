pub mod client;
pub mod config;
pub mod openai;
pub mod split;

pub use client::{FragmentStream, LlmClient, LlmRequest, LlmResponse, TokenUsage};
pub use config::{LlmConfig, build_llm_client};
pub use openai::OpenAiClient;
pub use split::{RegionSnapshot, Regions, SplitOutcome, StreamSplitter, consume_stream};
