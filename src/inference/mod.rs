mod http;
mod types;

pub use http::HttpInferenceClient;
pub use types::{EncodedFrame, FacePrediction, InferenceResponse};

use async_trait::async_trait;

use crate::error::CaptureError;

/// The emotion inference service.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(
        &self,
        frame: &EncodedFrame,
        session_id: Option<&str>,
    ) -> Result<InferenceResponse, CaptureError>;
}
