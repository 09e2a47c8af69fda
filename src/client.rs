use crate::{
    candidate::UploadCandidate,
    config::DetectionServiceConfig,
    detection::{DetectionResult, ResponseFormatError},
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("Failed to reach the detection service: {0}")]
    Network(String),
    #[error("Detection service returned {status}")]
    Server {
        status: u16,
        message: Option<String>,
    },
    #[error("Unexpected detection response: {0}")]
    ResponseFormat(#[from] ResponseFormatError),
}

#[async_trait]
pub trait Detector: Send + Sync + 'static {
    async fn detect(
        &self,
        candidate: &UploadCandidate,
        model: Option<&str>,
    ) -> Result<DetectionResult, DetectionError>;
}

#[derive(Deserialize)]
struct ServerMessage {
    message: Option<String>,
}

/// HTTP client for the remote inference service's `/predict` endpoint.
#[derive(Debug, Clone)]
pub struct DetectionClient {
    http: reqwest::Client,
    predict_url: String,
}

impl DetectionClient {
    pub fn new(config: &DetectionServiceConfig) -> Result<Self, DetectionError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DetectionError::Network(e.to_string()))?;

        Ok(Self {
            http,
            predict_url: config.get_predict_url(),
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    fn build_form(
        candidate: &UploadCandidate,
        model: Option<&str>,
    ) -> Result<Form, DetectionError> {
        let image = Part::bytes(candidate.bytes().to_vec())
            .file_name(candidate.file_name().to_string())
            .mime_str(candidate.mime_type())
            .map_err(|e| DetectionError::Network(format!("invalid image part: {}", e)))?;

        let form = Form::new().part("image", image);
        Ok(match model {
            Some(model) => form.text("model", model.to_string()),
            None => form,
        })
    }
}

#[async_trait]
impl Detector for DetectionClient {
    #[instrument(skip(self, candidate), fields(file = candidate.file_name(), size = candidate.size_bytes()))]
    async fn detect(
        &self,
        candidate: &UploadCandidate,
        model: Option<&str>,
    ) -> Result<DetectionResult, DetectionError> {
        let form = Self::build_form(candidate, model)?;

        let response = self
            .http
            .post(&self.predict_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Detection request failed: {:?}", e);
                DetectionError::Network(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DetectionError::Network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ServerMessage>(&body)
                .ok()
                .and_then(|m| m.message);
            tracing::warn!(status = status.as_u16(), ?message, "Detection service error");
            return Err(DetectionError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let result = DetectionResult::from_json(&body)?;
        tracing::debug!("Received {} detections", result.detections.len());

        Ok(result)
    }
}
