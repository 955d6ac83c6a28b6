//! Service settings, layered from built-in defaults, an optional TOML file
//! and the environment.

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Optional settings file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "mudra";

/// Upload ceiling applied when nothing else is configured (50 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Memory layout of the single-image batch handed to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, 48, 48, 1]`, the Keras default.
    Nhwc,
    /// `[1, 1, 48, 48]`
    Nchw,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub input_layout: InputLayout,
    /// Apply softmax to the raw model output before picking the confidence.
    pub softmax: bool,
    /// Empty means any origin is allowed.
    pub cors_origins: Vec<String>,
}

impl Settings {
    /// Build settings from defaults, `mudra.toml` (or the file named by
    /// `MUDRA_CONFIG`), `MUDRA_*` variables and finally `PORT`.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("MUDRA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let port = std::env::var("PORT").ok();

        Self::builder()?
            .add_source(File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix("MUDRA")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .set_override_option("port", port)?
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 5000)?
            .set_default("model_path", "hasta_mudra_classifier.onnx")?
            .set_default("labels_path", "label_encoder.json")?
            .set_default("upload_dir", "uploads")?
            .set_default("max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES as u64)?
            .set_default("input_layout", "nhwc")?
            .set_default("softmax", false)?
            .set_default("cors_origins", Vec::<String>::new())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "0.0.0.0".into(),
            port: 5000,
            model_path: "hasta_mudra_classifier.onnx".into(),
            labels_path: "label_encoder.json".into(),
            upload_dir: "uploads".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            input_layout: InputLayout::Nhwc,
            softmax: false,
            cors_origins: Vec::new(),
        }
    }
}
