pub mod ollama;
pub mod parser;
pub mod prompt;
pub mod types;

pub use ollama::{OllamaClient, OllamaSummarizer};
pub use types::{DocumentSummary, Relevance, Summarizer};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Cannot reach Ollama at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Ollama returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing failed: {0}")]
    JsonParsing(String),

    #[error("No summarization model available on Ollama")]
    NoModelAvailable,
}
