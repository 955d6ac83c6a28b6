use serde::{Deserialize, Serialize};

/// Body of `GET /`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub models_loaded: bool,
}

/// Body of a successful `POST /predict`. `mudra` and `label` always carry
/// the same value; older clients read one, newer ones the other.
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub mudra: String,
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
