use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{DiagnosisError, Result};

pub const DEFAULT_LABELS: [&str; 3] = ["BacterialBlight", "Blast", "BrownSpot"];

/// Ordered class labels; position `i` names model output column `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.into().trim().to_string())
            .collect();
        if names.is_empty() {
            return Err(DiagnosisError::config("label set is empty"));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.is_empty() {
                return Err(DiagnosisError::config("label set contains an empty label"));
            }
            if !seen.insert(name.as_str()) {
                return Err(DiagnosisError::config(format!("duplicate label '{}'", name)));
            }
        }
        Ok(Self { names })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        Self {
            names: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Reads one label per line, zero-based, skipping blank lines.
pub fn load_class_mapping(file_path: impl AsRef<Path>) -> Result<ClassLabels> {
    let file = File::open(file_path)?;
    let reader = BufReader::new(file);

    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let name = line.trim();
        if !name.is_empty() {
            names.push(name.to_string());
        }
    }

    ClassLabels::new(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_labels_keep_model_order() {
        let labels = ClassLabels::default();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(0), Some("BacterialBlight"));
        assert_eq!(labels.get(2), Some("BrownSpot"));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn rejects_empty_and_duplicate_sets() {
        assert!(ClassLabels::new(Vec::<String>::new()).is_err());
        assert!(ClassLabels::new(["Blast", "Blast"]).is_err());
        assert!(ClassLabels::new(["Blast", "  "]).is_err());
    }

    #[test]
    fn loads_labels_file_skipping_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "BacterialBlight\n\n  Blast \nBrownSpot\n").unwrap();
        file.flush().unwrap();

        let labels = load_class_mapping(file.path()).unwrap();

        assert_eq!(labels.iter().collect::<Vec<_>>(), vec!["BacterialBlight", "Blast", "BrownSpot"]);
    }
}
