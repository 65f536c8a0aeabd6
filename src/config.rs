//! Layered configuration: built-in defaults, then an optional TOML file,
//! then command-line flags and `PADDY_*` environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::{Args, LogFormat};
use crate::error::{DiagnosisError, Result};
use crate::mapping::{ClassLabels, DEFAULT_LABELS, load_class_mapping};
use crate::postprocess::{DEFAULT_CONFIDENCE_THRESHOLD, OutputKind};
use crate::preprocess::PreprocessConfig;
use crate::saliency::SaliencyConfig;

pub const LOCAL_CONFIG_FILE: &str = "paddy.toml";
pub const APP_DIR: &str = "paddy-disease-finder";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8501,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub cuda: bool,
    pub labels: Vec<String>,
    /// Takes precedence over `labels` when set.
    pub labels_file: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub output: OutputKind,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rice_model.onnx"),
            cuda: false,
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            labels_file: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            output: OutputKind::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: "paddy_disease_finder=info,tower_http=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub preprocess: PreprocessConfig,
    pub saliency: SaliencyConfig,
    pub logging: LoggingConfig,
    /// Extra or replacement treatment tips keyed by label.
    pub treatments: HashMap<String, Vec<String>>,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Relative model and label paths resolve against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.model.path = resolve(base, &config.model.path);
            config.model.labels_file = config.model.labels_file.map(|p| resolve(base, &p));
        }
        Ok(config)
    }

    /// Loads `explicit` if given, else the first of `./paddy.toml` and
    /// `<config dir>/paddy-disease-finder/config.toml` that exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }
        let candidates = [
            Some(PathBuf::from(LOCAL_CONFIG_FILE)),
            dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Ok((Self::from_file(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(model) = &args.model {
            self.model.path = model.clone();
        }
        if let Some(labels) = &args.labels {
            self.model.labels_file = Some(labels.clone());
        }
        if let Some(threshold) = args.threshold {
            self.model.confidence_threshold = threshold;
        }
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if args.cuda {
            self.model.cuda = true;
        }
        if args.no_saliency {
            self.saliency.enabled = false;
        }
        if let Some(format) = args.log_format {
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.model.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DiagnosisError::config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(DiagnosisError::config("max_upload_bytes must be positive"));
        }
        if self.model.labels_file.is_none() {
            ClassLabels::new(self.model.labels.iter().cloned())?;
        }
        self.preprocess.validate()?;
        self.saliency.validate()?;
        Ok(())
    }

    /// Defaults, file, then CLI; validated.
    pub fn load(args: &Args) -> Result<(Self, Option<PathBuf>)> {
        let (mut config, source) = Self::discover(args.config.as_deref())?;
        config.apply_args(args);
        config.validate()?;
        Ok((config, source))
    }

    pub fn class_labels(&self) -> Result<ClassLabels> {
        match &self.model.labels_file {
            Some(path) => load_class_mapping(path),
            None => ClassLabels::new(self.model.labels.iter().cloned()),
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{ChannelOrder, Layout};
    use tempfile::TempDir;

    #[test]
    fn defaults_follow_the_original_app() {
        let config = AppConfig::default();
        assert_eq!(config.model.confidence_threshold, 0.6);
        assert_eq!(config.preprocess.width, 224);
        assert_eq!(config.preprocess.height, 224);
        assert_eq!(config.class_labels().unwrap(), ClassLabels::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [server]
            port = 9000

            [model]
            path = "models/paddy.onnx"
            confidence_threshold = 0.75
            output = "logits"

            [preprocess]
            layout = "nchw"
            channel_order = "rgb"
            mean = [0.485, 0.456, 0.406]
            std = [0.229, 0.224, 0.225]

            [saliency]
            grid = 5

            [treatments]
            Blast = ["Drain the field for a few days"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.model.output, OutputKind::Logits);
        assert_eq!(config.model.labels.len(), 3);
        assert_eq!(config.preprocess.layout, Layout::Nchw);
        assert_eq!(config.preprocess.channel_order, ChannelOrder::Rgb);
        assert_eq!(config.preprocess.width, 224);
        assert_eq!(config.saliency.grid, 5);
        assert!(config.saliency.enabled);
        assert_eq!(config.treatments["Blast"].len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut config = AppConfig::from_toml_str("[model]\nconfidence_threshold = 0.8\n").unwrap();
        let args = Args {
            threshold: Some(0.5),
            port: Some(8080),
            no_saliency: true,
            model: Some(PathBuf::from("other.onnx")),
            ..Default::default()
        };
        config.apply_args(&args);

        assert_eq!(config.model.confidence_threshold, 0.5);
        assert_eq!(config.server.port, 8080);
        assert!(!config.saliency.enabled);
        assert_eq!(config.model.path, PathBuf::from("other.onnx"));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = AppConfig::default();
        config.model.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.model.labels = vec!["Blast".into(), "Blast".into()];
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.preprocess.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let config = AppConfig::from_toml_str(include_str!("../paddy.example.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.preprocess.layout, Layout::Nhwc);
        assert_eq!(config.preprocess.channel_order, ChannelOrder::Bgr);
        assert!(config.treatments.is_empty());
    }

    #[test]
    fn unknown_enum_value_is_a_parse_error() {
        let err = AppConfig::from_toml_str("[preprocess]\nlayout = \"chw\"\n").unwrap_err();
        assert!(matches!(err, DiagnosisError::Toml(_)));
    }

    #[test]
    fn file_paths_resolve_relative_to_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paddy.toml");
        std::fs::write(&path, "[model]\npath = \"rice.onnx\"\nlabels_file = \"/abs/labels.txt\"\n").unwrap();

        let (config, source) = AppConfig::discover(Some(path.as_path())).unwrap();

        assert_eq!(source.as_deref(), Some(path.as_path()));
        assert_eq!(config.model.path, dir.path().join("rice.onnx"));
        assert_eq!(config.model.labels_file, Some(PathBuf::from("/abs/labels.txt")));
    }
}
