use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Everything that can go wrong while serving a request. Each variant maps
/// to one status code and a `{"error": ...}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Models not loaded")]
    ModelsNotLoaded,

    #[error("No file uploaded")]
    NoFileUploaded,

    #[error("No file selected")]
    NoFileSelected,

    #[error("Invalid file type. Allowed types: png, jpg, jpeg, gif, bmp")]
    InvalidFileType,

    #[error("File too large. Maximum size is {}", max_upload_size(.limit_bytes))]
    PayloadTooLarge { limit_bytes: usize },

    #[error("Failed to save upload: {0}")]
    Upload(String),

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),
}

impl actix_web::error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(ErrorResponse {
                error: self.to_string(),
            })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoFileUploaded | ApiError::NoFileSelected | ApiError::InvalidFileType => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ModelsNotLoaded | ApiError::Upload(_) | ApiError::PredictionFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// The upload ceiling as reported to clients: whole megabytes when exact,
/// otherwise one decimal, falling back to kilobytes and bytes below 1MB.
fn max_upload_size(bytes: &usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    match *bytes {
        b if b >= MB && b % MB == 0 => format!("{}MB", b / MB),
        b if b >= MB => format!("{:.1}MB", b as f64 / MB as f64),
        b if b >= KB && b % KB == 0 => format!("{}KB", b / KB),
        b if b >= KB => format!("{:.1}KB", b as f64 / KB as f64),
        b => format!("{b} bytes"),
    }
}
