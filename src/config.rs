use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Serve an ONNX image classifier over HTTP.
#[derive(Debug, Clone, Parser)]
#[command(name = "image-classifier", version)]
pub struct Config {
    /// Interface to listen on
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// ONNX model loaded at startup
    #[arg(long = "model", default_value = "model.onnx")]
    pub model_path: PathBuf,

    /// JSON manifest declaring input size, layout and rescaling.
    /// Defaults to `<model>.json` when that file exists
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// JSON array of class names, re-read on every request
    #[arg(long, default_value = "class_names.json")]
    pub class_names: PathBuf,

    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    #[arg(long, default_value = "info")]
    pub log_level: log::LevelFilter,
}
