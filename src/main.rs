use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mudra_backend::server::{self, AppState};
use mudra_backend::{MudraModel, Settings};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::load().context("invalid configuration")?;

    info!("loading model and label table");
    let model = match MudraModel::load(&settings) {
        Ok(model) => Some(model),
        Err(e) => {
            error!("failed to load models, serving in degraded mode: {e:#}");
            None
        }
    };

    if let Err(e) = std::fs::create_dir_all(&settings.upload_dir) {
        warn!(dir = %settings.upload_dir.display(), "could not create upload directory: {e}");
    }

    let state = web::Data::new(AppState::new(model, &settings));
    let origins = settings.cors_origins.clone();
    let bind = (settings.host.clone(), settings.port);

    info!(
        models_loaded = state.models_loaded(),
        "server running at http://{}:{}", bind.0, bind.1
    );

    HttpServer::new(move || {
        App::new()
            .wrap(server::cors(&origins))
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(server::routes)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
