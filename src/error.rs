use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ErrorBody;

/// Failures of a single `/predict` request, one variant per pipeline stage.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("No file part in request")]
    MissingFile,
    #[error("No file part in request")]
    UnreadableForm(String),
    #[error("No file selected")]
    EmptyFilename,
    #[error("Unsupported file type. Allowed: png, jpg, jpeg, bmp")]
    UnsupportedType,
    #[error("Uploaded file is too large")]
    TooLarge { limit: usize },
    #[error("Cannot read the uploaded image")]
    Decode(String),
    #[error("Preprocessing failed")]
    Preprocess(String),
    #[error("Model prediction failed")]
    Inference(String),
    #[error("Unexpected model output shape")]
    OutputShape(String),
}

impl PredictError {
    pub fn detail(&self) -> Option<String> {
        match self {
            PredictError::MissingFile
            | PredictError::EmptyFilename
            | PredictError::UnsupportedType => None,
            PredictError::TooLarge { limit } => {
                Some(format!("upload exceeds the limit of {} bytes", limit))
            }
            PredictError::UnreadableForm(detail)
            | PredictError::Decode(detail)
            | PredictError::Preprocess(detail)
            | PredictError::Inference(detail)
            | PredictError::OutputShape(detail) => Some(detail.clone()),
        }
    }
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::MissingFile
            | PredictError::UnreadableForm(_)
            | PredictError::EmptyFilename
            | PredictError::UnsupportedType
            | PredictError::Decode(_) => StatusCode::BAD_REQUEST,
            PredictError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PredictError::Preprocess(_)
            | PredictError::Inference(_)
            | PredictError::OutputShape(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            detail: self.detail(),
        })
    }
}
