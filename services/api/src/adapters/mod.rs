pub mod db;
pub mod extract;
pub mod generation_llm;
pub mod rate_limit;

pub use db::DbAdapter;
pub use extract::FormatExtractor;
pub use generation_llm::OpenAiGenerationAdapter;
pub use rate_limit::RateLimitedGeneration;
