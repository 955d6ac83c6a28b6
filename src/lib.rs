//! HTTP service classifying hand gesture (mudra) photos with a pre-trained
//! image classifier.

pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod labels;
pub mod models;
pub mod onnx;
pub mod server;
pub mod upload;

pub use classifier::{Classifier, MudraModel, Prediction};
pub use config::Settings;
pub use error::ApiError;
pub use server::AppState;
