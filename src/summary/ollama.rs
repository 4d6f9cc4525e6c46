//! Ollama HTTP client and the summarizer built on it.
//!
//! Blocking reqwest: the orchestrator calls the summarizer under
//! `spawn_blocking`, and local model inference dwarfs any async plumbing
//! savings anyway.

use serde::{Deserialize, Serialize};

use super::parser::parse_summary_response;
use super::prompt::{
    document_prompt, overview_prompt, DOCUMENT_SYSTEM_PROMPT, OVERVIEW_SYSTEM_PROMPT,
};
use super::types::{DocumentSummary, Summarizer};
use super::SummaryError;
use crate::portal::types::{DocumentDescriptor, FacilityRecord};

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, SummaryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SummaryError::HttpClient(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default instance from configuration with a 5-minute timeout.
    pub fn default_local() -> Result<Self, SummaryError> {
        Self::new(&crate::config::ollama_base_url(), 300)
    }

    pub fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, SummaryError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                SummaryError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                SummaryError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                SummaryError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SummaryError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| SummaryError::MalformedResponse(e.to_string()))?;
        Ok(parsed.response)
    }

    pub fn list_models(&self) -> Result<Vec<String>, SummaryError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() {
                SummaryError::Connection(self.base_url.clone())
            } else {
                SummaryError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SummaryError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| SummaryError::MalformedResponse(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    pub fn is_model_available(&self, model: &str) -> Result<bool, SummaryError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TaggedModel>,
}

#[derive(Deserialize)]
struct TaggedModel {
    name: String,
}

/// Summarizer backed by a local Ollama model. Faults never escape: both
/// methods degrade to placeholder content carrying the error text.
pub struct OllamaSummarizer {
    client: OllamaClient,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(client: OllamaClient, model: String) -> Self {
        Self { client, model }
    }

    /// Build against the configured model, verifying it is actually pulled.
    pub fn from_config() -> Result<Self, SummaryError> {
        let client = OllamaClient::default_local()?;
        let model = crate::config::summary_model();
        match client.is_model_available(&model) {
            Ok(true) => {
                tracing::info!(model = %model, "Summarization model confirmed");
                Ok(Self::new(client, model))
            }
            Ok(false) => {
                tracing::warn!(model = %model, "Configured model not available on Ollama");
                Err(SummaryError::NoModelAvailable)
            }
            Err(e) => Err(e),
        }
    }
}

impl Summarizer for OllamaSummarizer {
    fn summarize_document(&self, text: &str, descriptor: &DocumentDescriptor) -> DocumentSummary {
        let prompt = document_prompt(text, descriptor);
        let outcome = self
            .client
            .generate(&self.model, &prompt, DOCUMENT_SYSTEM_PROMPT)
            .and_then(|response| parse_summary_response(&response, descriptor));
        match outcome {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(
                    document = %descriptor.label(),
                    error = %e,
                    "Summarization degraded to placeholder"
                );
                DocumentSummary::placeholder(descriptor, e.to_string())
            }
        }
    }

    fn facility_overview(
        &self,
        facility: &FacilityRecord,
        documents_found: usize,
        documents_processed: usize,
        findings: &[String],
    ) -> String {
        let prompt = overview_prompt(facility, documents_found, documents_processed, findings);
        match self
            .client
            .generate(&self.model, &prompt, OVERVIEW_SYSTEM_PROMPT)
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Overview generation failed, using fallback text");
                format!(
                    "Processed {documents_processed} of {documents_found} documents for {}. \
                     An automated overview could not be generated ({e}).",
                    facility.name
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/", 5).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    /// Compile-time proof the summarizer satisfies the collaborator trait.
    #[test]
    fn summarizer_satisfies_trait() {
        fn accepts<S: Summarizer>(_s: &S) {}
        let _: fn(&OllamaSummarizer) = accepts;
    }
}
