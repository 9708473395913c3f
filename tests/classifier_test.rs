use std::sync::{Arc, Mutex};
use std::thread;

use glimpse::{
    Classifier, ClassifierError, ImageModel, ImageSource, Metadata, Prediction, VideoFrame,
};
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use ndarray::Array4;

/// Returns fixed scores and remembers the shape and first value of every input it sees.
#[derive(Debug, Default)]
struct StubModel {
    scores: Vec<f32>,
    fail: bool,
    seen: Mutex<Vec<(Vec<usize>, f32)>>,
}

impl StubModel {
    fn returning(scores: Vec<f32>) -> Self {
        Self { scores, ..Default::default() }
    }

    fn failing(width: usize) -> Self {
        Self { scores: vec![0.0; width], fail: true, ..Default::default() }
    }
}

impl ImageModel for StubModel {
    fn output_width(&self) -> usize {
        self.scores.len()
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        self.seen
            .lock()
            .unwrap()
            .push((input.shape().to_vec(), input[[0, 0, 0, 0]]));
        if self.fail {
            return Err(ClassifierError::Prediction("stub failure".into()));
        }
        Ok(self.scores.clone())
    }
}

/// Shares a stub between the test and the classifier that owns it.
#[derive(Debug, Clone)]
struct Shared(Arc<StubModel>);

impl ImageModel for Shared {
    fn output_width(&self) -> usize {
        self.0.output_width()
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        self.0.forward(input)
    }
}

fn build(model: impl ImageModel + 'static, metadata: Metadata) -> Classifier {
    Classifier::builder()
        .with_image_model(model)
        .unwrap()
        .with_metadata(metadata)
        .build()
        .expect("Failed to create classifier")
}

fn abcd_classifier() -> Classifier {
    build(
        StubModel::returning(vec![0.1, 0.7, 0.05, 0.15]),
        Metadata::new(vec!["a", "b", "c", "d"]).with_image_size(16),
    )
}

fn test_image() -> RgbImage {
    RgbImage::from_pixel(30, 20, Rgb([120, 80, 40]))
}

fn prediction(class_name: &str, probability: f32) -> Prediction {
    Prediction { class_name: class_name.to_string(), probability }
}

#[test]
fn test_predict_returns_every_label_in_order() {
    let classifier = abcd_classifier();
    let image = test_image();
    let predictions = classifier.predict(&ImageSource::Bitmap(&image), false).unwrap();
    assert_eq!(
        predictions,
        vec![
            prediction("a", 0.1),
            prediction("b", 0.7),
            prediction("c", 0.05),
            prediction("d", 0.15),
        ]
    );
}

#[test]
fn test_top_k() {
    let classifier = abcd_classifier();
    let image = test_image();
    let predictions = classifier.predict_top_k(&ImageSource::Bitmap(&image), 2, false).unwrap();
    assert_eq!(predictions, vec![prediction("b", 0.7), prediction("d", 0.15)]);
}

#[test]
fn test_top_k_clamps_to_label_count() {
    let classifier = abcd_classifier();
    let image = test_image();
    let predictions = classifier.predict_top_k(&ImageSource::Bitmap(&image), 50, false).unwrap();
    assert_eq!(predictions.len(), 4);

    let mut names: Vec<&str> = predictions.iter().map(|p| p.class_name.as_str()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_top_k_ties_keep_label_order() {
    let classifier = build(
        StubModel::returning(vec![0.2, 0.3, 0.2, 0.3]),
        Metadata::new(vec!["w", "x", "y", "z"]).with_image_size(8),
    );
    let image = test_image();
    let names: Vec<String> = classifier
        .predict_top_k(&ImageSource::Bitmap(&image), 4, false)
        .unwrap()
        .into_iter()
        .map(|p| p.class_name)
        .collect();
    assert_eq!(names, vec!["x", "z", "w", "y"]);
}

#[test]
fn test_labels_and_total_classes() {
    let classifier = abcd_classifier();
    assert_eq!(classifier.total_classes(), 4);
    assert_eq!(classifier.class_labels(), &["a", "b", "c", "d"]);
    assert_eq!(classifier.metadata().image_size, 16);
}

#[test]
fn test_label_mismatch_fails_fast() {
    let result = Classifier::builder()
        .with_image_model(StubModel::returning(vec![0.5, 0.3, 0.2]))
        .unwrap()
        .with_metadata(Metadata::new(vec!["only", "two"]))
        .build();
    assert!(matches!(
        result,
        Err(ClassifierError::MetadataMismatch { labels: 2, classes: 3 })
    ));
}

#[test]
fn test_lenient_mismatch_truncates() -> Result<(), ClassifierError> {
    let classifier = Classifier::builder()
        .with_image_model(StubModel::returning(vec![0.5, 0.3, 0.2]))?
        .with_metadata(Metadata::new(vec!["only", "two"]).with_image_size(8))
        .allow_label_mismatch(true)
        .build()?;
    let image = test_image();
    let predictions = classifier.predict(&ImageSource::Bitmap(&image), false)?;
    assert_eq!(predictions, vec![prediction("only", 0.5), prediction("two", 0.3)]);
    Ok(())
}

#[test]
fn test_input_tensor_shape() {
    let stub = Arc::new(StubModel::returning(vec![1.0]));
    let classifier = build(
        Shared(Arc::clone(&stub)),
        Metadata::new(vec!["one"]).with_image_size(12),
    );
    let image = test_image();
    classifier.predict(&ImageSource::Bitmap(&image), false).unwrap();

    let seen = stub.seen.lock().unwrap();
    assert_eq!(seen[0].0, vec![1, 12, 12, 3]);
}

#[test]
fn test_grayscale_feeds_one_channel() {
    let stub = Arc::new(StubModel::returning(vec![1.0]));
    let classifier = build(
        Shared(Arc::clone(&stub)),
        Metadata::new(vec!["one"]).with_image_size(10).with_grayscale(true),
    );
    let image = RgbImage::from_pixel(10, 10, Rgb([100, 150, 200]));
    classifier.predict(&ImageSource::Bitmap(&image), false).unwrap();

    let seen = stub.seen.lock().unwrap();
    assert_eq!(seen[0].0, vec![1, 10, 10, 1]);
    let expected = (0.2989 * 100.0 + 0.587 * 150.0 + 0.114 * 200.0) / 127.0 - 1.0;
    assert!((seen[0].1 - expected).abs() < 1e-3);
}

#[test]
fn test_flipped_mirrors_input() {
    let stub = Arc::new(StubModel::returning(vec![1.0]));
    let classifier = build(
        Shared(Arc::clone(&stub)),
        Metadata::new(vec!["one"]).with_image_size(4),
    );
    // Black left half, white right half
    let image = RgbImage::from_fn(4, 4, |x, _| if x < 2 { Rgb([0, 0, 0]) } else { Rgb([254, 254, 254]) });
    classifier.predict(&ImageSource::Bitmap(&image), false).unwrap();
    classifier.predict(&ImageSource::Bitmap(&image), true).unwrap();

    let seen = stub.seen.lock().unwrap();
    assert_eq!(seen[0].1, -1.0);
    assert_eq!(seen[1].1, 1.0);
}

#[test]
fn test_every_source_variant() {
    let classifier = abcd_classifier();
    let dynamic = DynamicImage::ImageRgb8(test_image());
    let canvas = RgbaImage::from_pixel(20, 30, image::Rgba([1, 2, 3, 255]));
    let video = VideoFrame::new(test_image()).with_display_size(300, 200);
    let bitmap = test_image();

    for source in [
        ImageSource::Image(&dynamic),
        ImageSource::Canvas(&canvas),
        ImageSource::Video(&video),
        ImageSource::Bitmap(&bitmap),
    ] {
        assert_eq!(classifier.predict(&source, false).unwrap().len(), 4);
    }
}

#[test]
fn test_empty_image_rejected() {
    let classifier = abcd_classifier();
    let image = RgbImage::new(0, 0);
    let result = classifier.predict(&ImageSource::Bitmap(&image), false);
    assert!(matches!(result, Err(ClassifierError::Validation(_))));
    assert_eq!(classifier.live_intermediates(), 0);
}

#[test]
fn test_no_intermediates_survive_success() {
    let classifier = abcd_classifier();
    let image = test_image();
    classifier.predict(&ImageSource::Bitmap(&image), true).unwrap();
    assert_eq!(classifier.live_intermediates(), 0);
    classifier.predict_top_k(&ImageSource::Bitmap(&image), 2, false).unwrap();
    assert_eq!(classifier.live_intermediates(), 0);
}

#[test]
fn test_no_intermediates_survive_failure() {
    let classifier = build(StubModel::failing(2), Metadata::new(vec!["a", "b"]).with_image_size(8));
    let image = test_image();
    let result = classifier.predict_top_k(&ImageSource::Bitmap(&image), 1, true);
    assert!(matches!(result, Err(ClassifierError::Prediction(_))));
    assert_eq!(classifier.live_intermediates(), 0);
}

#[test]
fn test_short_model_output_is_an_error() {
    #[derive(Debug)]
    struct Truncating;

    impl ImageModel for Truncating {
        fn output_width(&self) -> usize {
            3
        }

        fn forward(&self, _input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
            Ok(vec![0.9])
        }
    }

    let classifier = build(Truncating, Metadata::new(vec!["a", "b", "c"]).with_image_size(8));
    let image = test_image();
    let result = classifier.predict(&ImageSource::Bitmap(&image), false);
    assert!(matches!(result, Err(ClassifierError::Prediction(_))));
    assert_eq!(classifier.live_intermediates(), 0);
}

#[test]
fn test_thread_safety() {
    let classifier = Arc::new(abcd_classifier());
    let mut handles = vec![];

    for _ in 0..3 {
        let classifier = Arc::clone(&classifier);
        handles.push(thread::spawn(move || {
            let image = test_image();
            let result = classifier.predict_top_k(&ImageSource::Bitmap(&image), 1, false);
            assert_eq!(result.unwrap()[0].class_name, "b");
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(classifier.live_intermediates(), 0);
}

#[test]
fn test_dispose_releases_model() {
    let stub = Arc::new(StubModel::returning(vec![1.0]));
    let classifier = build(Shared(Arc::clone(&stub)), Metadata::new(vec!["one"]));
    assert_eq!(Arc::strong_count(&stub), 2);
    classifier.dispose();
    assert_eq!(Arc::strong_count(&stub), 1);
}

#[test]
fn test_prediction_serializes_camel_case() {
    let value = serde_json::to_value(prediction("cat", 0.5)).unwrap();
    assert_eq!(value, serde_json::json!({"className": "cat", "probability": 0.5}));
}
