//! Client side of the audio integrity classifier.
//!
//! The classifier is an external service that scores each clip with a
//! confidence in `[0, 1]` that it is clean, complete speech.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ClassifierError {
    #[error("Integrity classifier unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Integrity classifier returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Integrity classifier returned {got} results for {expected} files")]
    MissingResult { expected: usize, got: usize },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Verdict for one file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub accepted: bool,
    pub confidence: f32,
}

/// Scores a batch of audio files.
pub trait IntegrityClassifier {
    /// One [`Classification`] per input path, in input order.
    fn classify(&self, paths: &[PathBuf]) -> Result<Vec<Classification>, ClassifierError>;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    files: &'a [PathBuf],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    results: Vec<Classification>,
}

/// Classifier reached over HTTP.
///
/// `POST {url}` with `{"files": [...]}` answers
/// `{"results": [{"accepted": bool, "confidence": f32}, ...]}`. The service
/// reads the files itself, so it must share the output filesystem.
pub struct HttpIntegrityClassifier {
    client: Client,
    url: String,
}

impl HttpIntegrityClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl IntegrityClassifier for HttpIntegrityClassifier {
    fn classify(&self, paths: &[PathBuf]) -> Result<Vec<Classification>, ClassifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { files: paths })
            .send()
            .map_err(|source| {
                if source.is_connect() || source.is_timeout() {
                    ClassifierError::Unreachable {
                        url: self.url.clone(),
                        source,
                    }
                } else {
                    ClassifierError::Http(source)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ClassifyResponse = response.json()?;
        if parsed.results.len() != paths.len() {
            return Err(ClassifierError::MissingResult {
                expected: paths.len(),
                got: parsed.results.len(),
            });
        }
        Ok(parsed.results)
    }
}
