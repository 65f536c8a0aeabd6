use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

/// Paddy Disease Finder web UI
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML config file
    #[arg(long, env = "PADDY_CONFIG")]
    pub config: Option<PathBuf>,

    /// ONNX model path
    #[arg(long, env = "PADDY_MODEL")]
    pub model: Option<PathBuf>,

    /// Class labels file, one label per line in model output order
    #[arg(long, env = "PADDY_LABELS")]
    pub labels: Option<PathBuf>,

    /// Minimum confidence for a confident diagnosis
    #[arg(long, env = "PADDY_THRESHOLD")]
    pub threshold: Option<f32>,

    /// Host to bind to
    #[arg(long, env = "PADDY_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PADDY_PORT")]
    pub port: Option<u16>,

    /// Run the model on CUDA
    #[arg(long)]
    pub cuda: bool,

    /// Skip the occlusion saliency overlay
    #[arg(long)]
    pub no_saliency: bool,

    #[arg(long, value_enum, env = "PADDY_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}
