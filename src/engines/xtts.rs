//! XTTS voice cloning through an HTTP inference server.
//!
//! The server keeps the multilingual XTTS model loaded and computes the
//! speaker conditioning from the reference recordings it is given. This
//! engine only ships requests and decodes the WAV it gets back.
//!
//! # Request format
//!
//! `POST {base_url}/tts_to_audio` with a JSON body:
//!
//! ```text
//! {
//!   "text": "Push now",
//!   "language": "en",
//!   "speaker_wav": ["baseline/luis/1.wav", "baseline/luis/2.wav"],
//!   "speed": 1.2,
//!   "temperature": 0.27,
//!   "top_k": 50,
//!   "top_p": 0.8,
//!   "repetition_penalty": 4.0,
//!   "length_penalty": 1.0,
//!   "enable_text_splitting": false
//! }
//! ```
//!
//! The response body is a WAV file.
//!
//! # Examples
//!
//! ```rust,no_run
//! use autovoicepack::engines::xtts::{XttsServerEngine, XttsServerParams};
//! use autovoicepack::{SynthesisPort, SynthesisRequest};
//! use std::path::PathBuf;
//!
//! let mut engine = XttsServerEngine::new(XttsServerParams::default())?;
//! let samples = vec![PathBuf::from("output/baseline/luis/1.wav")];
//! let request = SynthesisRequest {
//!     text: "Box this lap",
//!     reference_samples: &samples,
//!     speed: 1.2,
//!     temperature: 0.25,
//! };
//! engine.synthesize_to_file(&request, &PathBuf::from("box.raw.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;

use super::{check_reference_samples, decode_wav};
use crate::{SynthesisError, SynthesisPort, SynthesisRequest, SynthesisResult};

/// Parameters for connecting to and sampling from the XTTS server.
///
/// The sampling values are known to work for most cloned voices; moving
/// them far raises the odds of garbled output.
#[derive(Debug, Clone)]
pub struct XttsServerParams {
    /// Server root, e.g. `http://127.0.0.1:8020`.
    pub base_url: String,
    pub language: String,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub top_k: u32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub length_penalty: f32,
}

impl Default for XttsServerParams {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8020".to_string(),
            language: "en".to_string(),
            timeout: Some(Duration::from_secs(120)),
            top_k: 50,
            top_p: 0.8,
            repetition_penalty: 4.0,
            length_penalty: 1.0,
        }
    }
}

#[derive(Serialize)]
struct TtsRequestBody<'a> {
    text: &'a str,
    language: &'a str,
    speaker_wav: &'a [PathBuf],
    speed: f32,
    temperature: f32,
    top_k: u32,
    top_p: f32,
    repetition_penalty: f32,
    length_penalty: f32,
    enable_text_splitting: bool,
}

/// Voice-cloning engine backed by an XTTS inference server.
pub struct XttsServerEngine {
    client: Client,
    params: XttsServerParams,
}

impl XttsServerEngine {
    pub fn new(params: XttsServerParams) -> Result<Self, SynthesisError> {
        let mut builder = Client::builder();
        if let Some(timeout) = params.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            params,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/tts_to_audio", self.params.base_url.trim_end_matches('/'))
    }

    fn request_body<'a>(&'a self, request: &SynthesisRequest<'a>) -> TtsRequestBody<'a> {
        TtsRequestBody {
            text: request.text,
            language: &self.params.language,
            speaker_wav: request.reference_samples,
            speed: request.speed,
            temperature: request.temperature,
            top_k: self.params.top_k,
            top_p: self.params.top_p,
            repetition_penalty: self.params.repetition_penalty,
            length_penalty: self.params.length_penalty,
            enable_text_splitting: false,
        }
    }
}

impl SynthesisPort for XttsServerEngine {
    fn synthesize(
        &mut self,
        request: &SynthesisRequest<'_>,
    ) -> Result<SynthesisResult, SynthesisError> {
        check_reference_samples(request.reference_samples)?;

        let url = self.endpoint();
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(request))
            .send()
            .map_err(|source| {
                if source.is_connect() || source.is_timeout() {
                    SynthesisError::Unreachable {
                        url: url.clone(),
                        source,
                    }
                } else {
                    SynthesisError::Http(source)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SynthesisError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes()?;
        let result = decode_wav(&bytes)?;
        log::debug!(
            "Synthesized {:.2}s of audio for {:?}",
            result.duration_secs(),
            request.text
        );
        Ok(result)
    }
}
