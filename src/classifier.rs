use std::io::Cursor;
use std::time::Instant;

use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};

use crate::diagnosis::Diagnosis;
use crate::error::{DiagnosisError, Result};
use crate::mapping::ClassLabels;
use crate::model::Backend;
use crate::postprocess::{OutputKind, gate, to_probabilities};
use crate::preprocess::{Layout, Processor};
use crate::saliency::{SaliencyConfig, occlusion_map, render_overlay};

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub threshold: f32,
    pub output: OutputKind,
    pub saliency: SaliencyConfig,
}

/// Decodes uploaded bytes into an RGB image, accepting JPEG and PNG only.
///
/// EXIF orientation is applied so camera captures come out upright.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) | Ok(ImageFormat::Png) => {}
        Ok(other) => return Err(DiagnosisError::UnsupportedFormat(format!("{:?}", other))),
        Err(_) => return Err(DiagnosisError::UnsupportedFormat("unrecognized data".into())),
    }

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    if img.width() == 0 || img.height() == 0 {
        return Err(DiagnosisError::EmptyImage);
    }
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// The pretrained leaf classifier, loaded once per process.
pub struct DiseaseClassifier {
    backend: Box<dyn Backend>,
    processor: Processor,
    labels: ClassLabels,
    settings: ClassifierSettings,
}

impl std::fmt::Debug for DiseaseClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiseaseClassifier")
            .field("processor", &self.processor)
            .field("labels", &self.labels)
            .field("settings", &self.settings)
            .finish()
    }
}

impl DiseaseClassifier {
    pub fn new(
        backend: Box<dyn Backend>,
        processor: Processor,
        labels: ClassLabels,
        settings: ClassifierSettings,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&settings.threshold) {
            return Err(DiagnosisError::config(format!(
                "confidence threshold must be within [0, 1], got {}",
                settings.threshold
            )));
        }
        processor.config.validate()?;
        settings.saliency.validate()?;
        if let Some(dims) = backend.input_dims() {
            check_input_dims(&dims, &processor)?;
        }

        Ok(Self {
            backend,
            processor,
            labels,
            settings,
        })
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn threshold(&self) -> f32 {
        self.settings.threshold
    }

    /// Resize, normalize, run the model, and gate the top class.
    pub fn diagnose(&mut self, image: &DynamicImage) -> Result<Diagnosis> {
        let t = Instant::now();
        let xs = self.processor.preprocess(std::slice::from_ref(image))?;
        let scores = self.backend.forward(xs)?;
        if scores.nrows() != 1 {
            return Err(DiagnosisError::UnexpectedOutput(scores.shape().to_vec()));
        }

        let probs = to_probabilities(scores.row(0), self.settings.output);
        let mut diagnosis = gate(&probs, self.settings.threshold, &self.labels)?;

        if let (true, true, Some(idx)) = (
            diagnosis.is_confident(),
            self.settings.saliency.enabled,
            diagnosis.class_index,
        ) {
            match self.saliency(image, idx, diagnosis.confidence) {
                Ok(overlay) => diagnosis.gradcam = Some(overlay),
                Err(e) => tracing::warn!(error = %e, "saliency map failed, returning result without it"),
            }
        }

        tracing::info!(
            status = ?diagnosis.status,
            prediction = diagnosis.prediction.as_deref().unwrap_or("-"),
            confidence = diagnosis.confidence,
            elapsed_ms = t.elapsed().as_millis() as u64,
            "diagnosis"
        );
        Ok(diagnosis)
    }

    fn saliency(&mut self, image: &DynamicImage, class_index: usize, confidence: f32) -> Result<image::RgbImage> {
        let t = Instant::now();
        let resized = self.processor.resize(image)?;
        let heat = occlusion_map(
            self.backend.as_mut(),
            &self.processor,
            self.settings.output,
            &resized,
            class_index,
            confidence,
            &self.settings.saliency,
        )?;
        let overlay = render_overlay(&image.to_rgb8(), &heat, self.settings.saliency.grid, self.settings.saliency.opacity);
        tracing::debug!(elapsed = ?t.elapsed(), grid = self.settings.saliency.grid, "saliency map");
        Ok(overlay)
    }
}

/// Fails when the model declares a fixed input size that the preprocessing would not produce.
fn check_input_dims(dims: &[i64], processor: &Processor) -> Result<()> {
    if dims.len() != 4 {
        tracing::warn!(?dims, "model input is not rank 4, cannot verify preprocessing size");
        return Ok(());
    }
    let config = &processor.config;
    let expected = match config.layout {
        Layout::Nhwc => [config.height as i64, config.width as i64, 3],
        Layout::Nchw => [3, config.height as i64, config.width as i64],
    };
    for (declared, wanted) in dims[1..].iter().zip(expected) {
        // negative dimensions are symbolic
        if *declared > 0 && *declared != wanted {
            return Err(DiagnosisError::config(format!(
                "model expects input {:?} but preprocessing produces {:?} ({:?})",
                dims, expected, config.layout
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::Status;
    use crate::preprocess::PreprocessConfig;
    use image::{Rgb, RgbImage};
    use ndarray::{Array2, Array4};

    struct FixedScores {
        row: Vec<f32>,
        dims: Option<Vec<i64>>,
    }

    impl Backend for FixedScores {
        fn forward(&mut self, batch: Array4<f32>) -> Result<Array2<f32>> {
            let n = batch.dim().0;
            let flat: Vec<f32> = (0..n).flat_map(|_| self.row.clone()).collect();
            Ok(Array2::from_shape_vec((n, self.row.len()), flat)?)
        }

        fn input_dims(&self) -> Option<Vec<i64>> {
            self.dims.clone()
        }
    }

    fn settings(saliency: bool) -> ClassifierSettings {
        ClassifierSettings {
            threshold: 0.6,
            output: OutputKind::Auto,
            saliency: SaliencyConfig { enabled: saliency, grid: 2, ..Default::default() },
        }
    }

    fn classifier(row: Vec<f32>, saliency: bool) -> DiseaseClassifier {
        DiseaseClassifier::new(
            Box::new(FixedScores { row, dims: None }),
            Processor::new(PreprocessConfig::default()),
            ClassLabels::default(),
            settings(saliency),
        )
        .unwrap()
    }

    fn leaf() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([40, 160, 40])))
    }

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn confident_result_carries_label_and_overlay() {
        let mut classifier = classifier(vec![0.05, 0.05, 0.9], true);
        let d = classifier.diagnose(&leaf()).unwrap();

        assert_eq!(d.status, Status::Confident);
        assert_eq!(d.prediction.as_deref(), Some("BrownSpot"));
        assert!((d.confidence - 0.9).abs() < 1e-6);
        let overlay = d.gradcam.expect("overlay");
        assert_eq!(overlay.dimensions(), (64, 48));
    }

    #[test]
    fn uncertain_result_has_no_label_or_overlay() {
        let mut classifier = classifier(vec![0.5, 0.3, 0.2], true);
        let d = classifier.diagnose(&leaf()).unwrap();

        assert_eq!(d.status, Status::Uncertain);
        assert!(d.prediction.is_none());
        assert!(d.gradcam.is_none());
    }

    #[test]
    fn saliency_can_be_disabled() {
        let mut classifier = classifier(vec![0.9, 0.05, 0.05], false);
        assert!(classifier.diagnose(&leaf()).unwrap().gradcam.is_none());
    }

    #[test]
    fn wrong_class_count_is_rejected() {
        let mut classifier = classifier(vec![0.1, 0.9], false);
        assert!(matches!(
            classifier.diagnose(&leaf()),
            Err(DiagnosisError::ClassCountMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn exposes_configured_threshold() {
        let mut s = settings(false);
        s.threshold = 0.75;
        let classifier = DiseaseClassifier::new(
            Box::new(FixedScores { row: vec![0.7, 0.2, 0.1], dims: None }),
            Processor::new(PreprocessConfig::default()),
            ClassLabels::default(),
            s,
        )
        .unwrap();
        assert_eq!(classifier.threshold(), 0.75);
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut s = settings(false);
        s.threshold = 1.2;
        let result = DiseaseClassifier::new(
            Box::new(FixedScores { row: vec![1.0, 0.0, 0.0], dims: None }),
            Processor::new(PreprocessConfig::default()),
            ClassLabels::default(),
            s,
        );
        assert!(result.is_err());
    }

    #[test]
    fn declared_input_size_must_match_preprocessing() {
        let build = |dims: Vec<i64>| {
            DiseaseClassifier::new(
                Box::new(FixedScores { row: vec![1.0, 0.0, 0.0], dims: Some(dims) }),
                Processor::new(PreprocessConfig::default()),
                ClassLabels::default(),
                settings(false),
            )
        };
        assert!(build(vec![-1, 224, 224, 3]).is_ok());
        assert!(build(vec![-1, 256, 256, 3]).is_err());
        assert!(build(vec![-1, 3, 224, 224]).is_err());
    }

    #[test]
    fn decodes_png_and_jpeg_only() {
        let img = leaf();
        let png = decode_image(&encode(&img, ImageFormat::Png)).unwrap();
        assert_eq!((png.width(), png.height()), (64, 48));
        assert!(decode_image(&encode(&img, ImageFormat::Jpeg)).is_ok());

        let bmp = encode(&img, ImageFormat::Bmp);
        assert!(matches!(decode_image(&bmp), Err(DiagnosisError::UnsupportedFormat(_))));
        assert!(matches!(decode_image(b"not an image"), Err(DiagnosisError::UnsupportedFormat(_))));
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let png = encode(&leaf(), ImageFormat::Png);
        let truncated = &png[..png.len() / 2];
        assert!(matches!(decode_image(truncated), Err(DiagnosisError::Decode(_))));
    }
}
