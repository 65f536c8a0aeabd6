use std::collections::HashMap;

use crate::mapping::ClassLabels;

const BACTERIAL_BLIGHT: &[&str] = &[
    "Use disease-free seeds",
    "Avoid excessive nitrogen fertilizer",
    "Spray copper-based bactericides",
    "Ensure proper field drainage",
];

const BLAST: &[&str] = &[
    "Apply recommended fungicides (e.g., Tricyclazole)",
    "Maintain proper spacing between plants",
    "Avoid excessive nitrogen usage",
    "Grow blast-resistant varieties",
];

const BROWN_SPOT: &[&str] = &[
    "Apply balanced fertilizers",
    "Use fungicides like Mancozeb",
    "Improve soil nutrient levels",
    "Avoid drought stress",
];

/// Treatment and field-management tips keyed by class label.
#[derive(Debug, Clone)]
pub struct TreatmentBook {
    tips: HashMap<String, Vec<String>>,
}

impl Default for TreatmentBook {
    fn default() -> Self {
        let tips = [
            ("BacterialBlight", BACTERIAL_BLIGHT),
            ("Blast", BLAST),
            ("BrownSpot", BROWN_SPOT),
        ]
        .into_iter()
        .map(|(label, tips)| (label.to_string(), tips.iter().map(|t| t.to_string()).collect()))
        .collect();
        Self { tips }
    }
}

impl TreatmentBook {
    /// Built-in tips with `overrides` replacing or adding entries.
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut book = Self::default();
        for (label, tips) in overrides {
            book.tips.insert(label.clone(), tips.clone());
        }
        book
    }

    pub fn tips(&self, label: &str) -> &[String] {
        self.tips.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Labels that would render without any advice.
    pub fn missing_for<'a>(&self, labels: &'a ClassLabels) -> Vec<&'a str> {
        labels.iter().filter(|label| self.tips(label).is_empty()).collect()
    }
}
