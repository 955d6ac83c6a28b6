use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::Method;
use actix_web::web;

use crate::classifier::MudraModel;
use crate::config::Settings;
use crate::handlers;

/// Everything a request handler needs, built once before the server starts.
/// `model` is `None` when the artifacts failed to load.
#[derive(Clone)]
pub struct AppState {
    pub model: Option<Arc<MudraModel>>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(model: Option<MudraModel>, settings: &Settings) -> Self {
        AppState {
            model: model.map(Arc::new),
            upload_dir: settings.upload_dir.clone(),
            max_upload_bytes: settings.max_upload_bytes,
        }
    }

    pub fn models_loaded(&self) -> bool {
        self.model.is_some()
    }
}

/// Origin checks for every route. Pre-flight negotiation is left to
/// [`handlers::preflight`] so `OPTIONS /predict` always answers 204.
pub fn cors(origins: &[String]) -> Cors {
    let cors = Cors::default().disable_preflight();

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return cors.allow_any_origin();
    }
    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(handlers::health)))
        .service(
            web::resource("/predict")
                .route(web::post().to(handlers::predict))
                .route(web::method(Method::OPTIONS).to(handlers::preflight)),
        );
}
