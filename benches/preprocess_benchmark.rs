use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glimpse::{
    AllocationTracker, Classifier, ClassifierError, ImageModel, ImageSource, Metadata,
    Preprocessor, TensorLayout,
};
use image::{Rgb, RgbImage};
use ndarray::Array4;

#[derive(Debug)]
struct ConstantModel(Vec<f32>);

impl ImageModel for ConstantModel {
    fn output_width(&self) -> usize {
        self.0.len()
    }

    fn forward(&self, _input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        Ok(self.0.clone())
    }
}

fn webcam_frame() -> RgbImage {
    RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]))
}

fn bench_preprocessing(c: &mut Criterion) {
    let frame = webcam_frame();
    let tracker = AllocationTracker::new();
    let mut group = c.benchmark_group("Preprocessing");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let rgb = Preprocessor::new(224, false, TensorLayout::Nhwc);
    group.bench_function("rgb_224", |b| b.iter(|| {
        rgb.process(black_box(&ImageSource::Bitmap(&frame)), false, &tracker).unwrap()
    }));

    group.bench_function("rgb_224_flipped", |b| b.iter(|| {
        rgb.process(black_box(&ImageSource::Bitmap(&frame)), true, &tracker).unwrap()
    }));

    let gray = Preprocessor::new(224, true, TensorLayout::Nhwc);
    group.bench_function("grayscale_224", |b| b.iter(|| {
        gray.process(black_box(&ImageSource::Bitmap(&frame)), false, &tracker).unwrap()
    }));

    group.finish();
}

fn bench_ranking(c: &mut Criterion) {
    let frame = webcam_frame();
    let labels: Vec<String> = (0..1000).map(|i| format!("class_{}", i)).collect();
    let scores: Vec<f32> = (0..1000).map(|i| ((i * 7919) % 1000) as f32 / 1000.0).collect();
    let classifier = Classifier::builder()
        .with_image_model(ConstantModel(scores))
        .unwrap()
        .with_metadata(Metadata::new(labels))
        .build()
        .unwrap();

    let mut group = c.benchmark_group("Prediction");
    group.sample_size(50);

    for k in [1, 5, 1000] {
        group.bench_function(format!("top_{}_of_1000", k), |b| b.iter(|| {
            classifier.predict_top_k(black_box(&ImageSource::Bitmap(&frame)), k, false).unwrap()
        }));
    }

    group.finish();
}

criterion_group!(benches, bench_preprocessing, bench_ranking);
criterion_main!(benches);
