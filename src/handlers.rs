use actix_multipart::Multipart;
use actix_web::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_HEADERS, CONTENT_LENGTH,
};
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{HealthResponse, PredictionResponse};
use crate::server::AppState;
use crate::upload::receive_upload;

pub const SERVICE_NAME: &str = "Hasta Mudra Classification API";

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".into(),
        message: SERVICE_NAME.into(),
        models_loaded: state.models_loaded(),
    })
}

pub async fn preflight(req: HttpRequest) -> HttpResponse {
    let mut resp = HttpResponse::NoContent();
    resp.insert_header((ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
        .insert_header((ACCESS_CONTROL_MAX_AGE, "3600"));
    if let Some(requested) = req.headers().get(ACCESS_CONTROL_REQUEST_HEADERS) {
        resp.insert_header((ACCESS_CONTROL_ALLOW_HEADERS, requested.clone()));
    }
    resp.finish()
}

pub async fn predict(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let span = info_span!("predict", request_id = %Uuid::new_v4());
    classify_upload(state, req, payload).instrument(span).await
}

async fn classify_upload(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let model = match &state.model {
        Some(model) => model.clone(),
        None => {
            error!("rejecting prediction: models not loaded");
            return Err(ApiError::ModelsNotLoaded);
        }
    };

    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.map_or(false, |len| len > state.max_upload_bytes) {
        warn!(content_length = ?declared, "upload exceeds size ceiling");
        return Err(ApiError::PayloadTooLarge {
            limit_bytes: state.max_upload_bytes,
        });
    }

    let upload = receive_upload(payload, state.upload_dir.clone(), state.max_upload_bytes)
        .await
        .map_err(|e| {
            warn!("upload rejected: {e}");
            e
        })?;
    info!(filename = %upload.filename, size = upload.size, "upload saved");

    // The scratch file is dropped, and so removed, inside the blocking task
    // once the prediction finishes, whatever its outcome.
    let prediction = web::block(move || {
        let result = model.predict_file(upload.file.path());
        drop(upload);
        result
    })
    .await
    .map_err(|e| ApiError::PredictionFailed(e.to_string()))?
    .map_err(|e| {
        error!("prediction failed: {e:?}");
        ApiError::PredictionFailed(format!("{e:#}"))
    })?;

    let confidence = (prediction.confidence * 100.0).round() / 100.0;
    Ok(HttpResponse::Ok().json(PredictionResponse {
        mudra: prediction.label.clone(),
        label: prediction.label,
        confidence,
    }))
}
