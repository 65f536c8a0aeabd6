use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error("Invalid image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Unsupported image format: {0} (expected JPEG or PNG)")]
    UnsupportedFormat(String),

    #[error("Image has no pixels")]
    EmptyImage,

    #[error("Resize error: {0}")]
    Resize(String),

    #[error("Model run error: {0}")]
    Model(#[from] ort::Error),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Unexpected model output shape {0:?}")]
    UnexpectedOutput(Vec<usize>),

    #[error("Model returned {actual} scores per image, label set has {expected}")]
    ClassCountMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DiagnosisError {
    pub fn config(message: impl Into<String>) -> Self {
        DiagnosisError::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DiagnosisError>;
