use image::RgbImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Confident,
    Uncertain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
    pub label: String,
    pub confidence: f32,
}

/// Outcome of classifying one leaf image.
///
/// `prediction`, `class_index` and `scores` are only populated when
/// `status` is [`Status::Confident`].
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub status: Status,
    pub prediction: Option<String>,
    pub class_index: Option<usize>,
    /// Top-class confidence, always within `[0, 1]`.
    pub confidence: f32,
    /// Per-class confidences, highest first.
    pub scores: Vec<ClassScore>,
    /// Occlusion saliency overlay at the original image resolution.
    pub gradcam: Option<RgbImage>,
}

impl Diagnosis {
    pub fn uncertain(confidence: f32) -> Self {
        Self {
            status: Status::Uncertain,
            prediction: None,
            class_index: None,
            confidence,
            scores: Vec::new(),
            gradcam: None,
        }
    }

    pub fn is_confident(&self) -> bool {
        self.status == Status::Confident
    }
}
