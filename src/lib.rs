pub mod classifier;
pub mod cli;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod helpers;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod page;
pub mod postprocess;
pub mod preprocess;
pub mod saliency;
pub mod service;
pub mod treatments;

pub use crate::classifier::{ClassifierSettings, DiseaseClassifier, decode_image};
pub use crate::cli::Args;
pub use crate::config::AppConfig;
pub use crate::diagnosis::{ClassScore, Diagnosis, Status};
pub use crate::error::{DiagnosisError, Result};
pub use crate::mapping::{ClassLabels, load_class_mapping};
pub use crate::model::{Backend, OnnxModel};
pub use crate::postprocess::{OutputKind, argmax_and_max, gate, softmax, to_probabilities};
pub use crate::preprocess::{PreprocessConfig, Processor};
pub use crate::saliency::SaliencyConfig;
pub use crate::service::{AppError, AppState, SharedState, router};
pub use crate::treatments::TreatmentBook;
