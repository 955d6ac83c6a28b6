//! Turning an uploaded image into a mudra prediction.
//!
//! The classifier expects a single 48x48 grayscale image with intensities in
//! `[0, 1]`, batched as one item. Its output is one score per class, decoded
//! through the [`LabelTable`] fitted alongside it.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use ndarray::Array4;
use tracing::{debug, info};

use crate::config::{InputLayout, Settings};
use crate::labels::LabelTable;
use crate::onnx::OnnxClassifier;

/// Side of the square grid the classifier was trained on.
pub const INPUT_SIZE: u32 = 48;

/// A forward pass over a batch holding exactly one preprocessed image.
pub trait Classifier: Send + Sync {
    /// One score per class, in label table order.
    fn forward(&self, batch: &Array4<f32>) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Percentage in `[0, 100]`.
    pub confidence: f64,
}

/// The classifier artifact and its label table, loaded together at startup
/// and never mutated afterwards.
pub struct MudraModel {
    classifier: Box<dyn Classifier>,
    labels: LabelTable,
    layout: InputLayout,
    softmax: bool,
}

impl MudraModel {
    pub fn new(classifier: Box<dyn Classifier>, labels: LabelTable) -> Self {
        MudraModel {
            classifier,
            labels,
            layout: InputLayout::Nhwc,
            softmax: false,
        }
    }

    pub fn with_layout(mut self, layout: InputLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_softmax(mut self, softmax: bool) -> Self {
        self.softmax = softmax;
        self
    }

    /// Load both artifacts from the paths in `settings`.
    pub fn load(settings: &Settings) -> Result<Self> {
        let labels = LabelTable::load(&settings.labels_path)?;
        let classifier = OnnxClassifier::load(&settings.model_path, settings.input_layout)?;

        info!(
            model = %settings.model_path.display(),
            classes = labels.len(),
            "classifier loaded"
        );

        Ok(MudraModel::new(Box::new(classifier), labels)
            .with_layout(settings.input_layout)
            .with_softmax(settings.softmax))
    }

    /// Decode the image stored at `path` and classify it.
    pub fn predict_file(&self, path: &Path) -> Result<Prediction> {
        debug!(path = %path.display(), "decoding upload");
        let image = decode_image(path)?;
        self.predict_image(&image)
    }

    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction> {
        let batch = preprocess(image, self.layout);

        debug!("running model prediction");
        let mut scores = self.classifier.forward(&batch)?;
        if self.softmax {
            softmax(&mut scores);
        }

        let (index, probability) =
            top_class(&scores).ok_or_else(|| anyhow!("model returned no class scores"))?;
        let label = self.labels.decode(index)?.to_string();
        let confidence = (f64::from(probability) * 100.0).clamp(0.0, 100.0);

        info!(%label, "prediction complete with {confidence:.2}% confidence");

        Ok(Prediction { label, confidence })
    }
}

/// Decode an image file, sniffing the format from its content before
/// trusting the extension.
pub fn decode_image(path: &Path) -> Result<DynamicImage> {
    let image = image::io::Reader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()?
        .decode()?;
    Ok(image)
}

pub fn input_shape(layout: InputLayout) -> [usize; 4] {
    let side = INPUT_SIZE as usize;
    match layout {
        InputLayout::Nhwc => [1, side, side, 1],
        InputLayout::Nchw => [1, 1, side, side],
    }
}

/// Grayscale with ITU-R 601-2 luma weights, the conversion the classifier
/// was trained on. `DynamicImage::to_luma8` uses Rec.709 weights instead.
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000;
        Luma([luma as u8])
    })
}

/// Grayscale, resize to the input grid and scale to `[0, 1]`.
pub fn preprocess(image: &DynamicImage, layout: InputLayout) -> Array4<f32> {
    let gray = to_gray(image);
    let resized = imageops::resize(&gray, INPUT_SIZE, INPUT_SIZE, FilterType::Nearest);

    let mut batch = Array4::<f32>::zeros(input_shape(layout));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let value = f32::from(pixel[0]) / 255.0;
        match layout {
            InputLayout::Nhwc => batch[[0, y, x, 0]] = value,
            InputLayout::Nchw => batch[[0, 0, y, x]] = value,
        }
    }
    batch
}

/// Index and score of the highest-scoring class. NaNs never win.
pub fn top_class(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
}

pub fn softmax(scores: &mut [f32]) {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for score in scores.iter_mut() {
        *score = (*score - max).exp();
        sum += *score;
    }
    if sum > 0.0 {
        scores.iter_mut().for_each(|score| *score /= sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    struct Fixed(Vec<f32>);

    impl Classifier for Fixed {
        fn forward(&self, batch: &Array4<f32>) -> Result<Vec<f32>> {
            assert_eq!(batch.shape(), &[1, 48, 48, 1]);
            Ok(self.0.clone())
        }
    }

    fn labels() -> LabelTable {
        LabelTable::new(vec!["Alapadma".into(), "Pataka".into(), "Mayura".into()]).unwrap()
    }

    #[test]
    fn preprocess_scales_to_unit_range() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(96, 64, Luma([255])));
        let batch = preprocess(&img, InputLayout::Nhwc);

        assert_eq!(batch.shape(), &[1, 48, 48, 1]);
        assert!(batch.iter().all(|v| (*v - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn preprocess_respects_layout() {
        let mut img = GrayImage::new(48, 48);
        img.put_pixel(5, 2, Luma([51]));
        let img = DynamicImage::ImageLuma8(img);

        let nhwc = preprocess(&img, InputLayout::Nhwc);
        let nchw = preprocess(&img, InputLayout::Nchw);

        assert_eq!(nchw.shape(), &[1, 1, 48, 48]);
        assert!((nhwc[[0, 2, 5, 0]] - 0.2).abs() < 1e-6);
        assert!((nchw[[0, 0, 2, 5]] - 0.2).abs() < 1e-6);
        assert_eq!(nhwc[[0, 5, 2, 0]], 0.0);
    }

    #[test]
    fn colour_input_becomes_single_channel() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([0, 0, 0])));
        let batch = preprocess(&img, InputLayout::Nhwc);
        assert_eq!(batch.shape(), &[1, 48, 48, 1]);
        assert!(batch.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn gray_conversion_uses_rec601_weights() {
        let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(48, 48, Rgb([255, 0, 0])));
        let batch = preprocess(&red, InputLayout::Nhwc);
        assert_eq!((batch[[0, 0, 0, 0]] * 255.0).round() as u8, 76);

        let gray = to_gray(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            1,
            1,
            Rgb([0, 255, 0]),
        )));
        assert_eq!(gray.get_pixel(0, 0)[0], 149);

        let gray = to_gray(&DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            1,
            1,
            Rgba([0, 0, 255, 10]),
        )));
        assert_eq!(gray.get_pixel(0, 0)[0], 29);
    }

    #[test]
    fn gray_input_passes_through() {
        let mut img = GrayImage::new(3, 1);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 0, Luma([128]));
        img.put_pixel(2, 0, Luma([255]));
        let gray = to_gray(&DynamicImage::ImageLuma8(img.clone()));
        assert_eq!(gray, img);
    }

    #[test]
    fn top_class_skips_nan() {
        assert_eq!(top_class(&[0.1, f32::NAN, 0.7, 0.2]), Some((2, 0.7)));
        assert_eq!(top_class(&[]), None);
    }

    #[test]
    fn softmax_sums_to_one() {
        let mut scores = vec![1.0, 2.0, 3.0];
        softmax(&mut scores);
        let sum: f32 = scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(top_class(&scores).map(|(i, _)| i), Some(2));
    }

    #[test]
    fn predicts_label_and_percentage() {
        let model = MudraModel::new(Box::new(Fixed(vec![0.05, 0.9, 0.05])), labels());
        let img = DynamicImage::ImageLuma8(GrayImage::new(30, 30));

        let prediction = model.predict_image(&img).unwrap();
        assert_eq!(prediction.label, "Pataka");
        assert!((prediction.confidence - 90.0).abs() < 1e-3);
    }

    #[test]
    fn unlabelled_index_fails() {
        let model = MudraModel::new(Box::new(Fixed(vec![0.1, 0.1, 0.1, 0.7])), labels());
        let img = DynamicImage::ImageLuma8(GrayImage::new(30, 30));

        let err = model.predict_image(&img).unwrap_err();
        assert!(err.to_string().contains("class index 3"));
    }

    #[test]
    fn logits_are_normalised_when_asked() {
        let model =
            MudraModel::new(Box::new(Fixed(vec![2.0, 9.0, 1.0])), labels()).with_softmax(true);
        let img = DynamicImage::ImageLuma8(GrayImage::new(30, 30));

        let prediction = model.predict_image(&img).unwrap();
        assert_eq!(prediction.label, "Pataka");
        assert!(prediction.confidence > 99.0 && prediction.confidence <= 100.0);
    }

    #[test]
    fn undecodable_file_fails() {
        let mut f = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        std::io::Write::write_all(&mut f, b"not an image").unwrap();
        assert!(decode_image(f.path()).is_err());
    }
}
