use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use glimpse::{
    dir_locations, is_remote, Classifier, ImageSource, ModelManager, RuntimeConfig,
    DEFAULT_MAX_PREDICTIONS,
};
use log::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory or base URL holding model.onnx and metadata.json
    #[arg(short, long, conflicts_with_all = ["model", "metadata"])]
    dir: Option<String>,

    /// Path or URL of the ONNX model
    #[arg(short, long, requires = "metadata")]
    model: Option<String>,

    /// Path or URL of the metadata document
    #[arg(long, requires = "model")]
    metadata: Option<String>,

    /// Images to classify
    #[arg(required = true)]
    images: Vec<String>,

    /// Number of classes to report per image
    #[arg(short = 'k', long, default_value_t = DEFAULT_MAX_PREDICTIONS)]
    top_k: usize,

    /// Mirror each image horizontally before classifying
    #[arg(long)]
    flipped: bool,

    /// Intra-op threads for ONNX Runtime (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Force a fresh download of a remote model
    #[arg(short, long)]
    fresh: bool,
}

/// Model and metadata locations from either `--dir` or `--model`/`--metadata`.
fn locations(args: &Args) -> Result<(String, String)> {
    match (&args.dir, &args.model, &args.metadata) {
        (Some(dir), _, _) => Ok(dir_locations(dir)),
        (None, Some(model), Some(metadata)) => Ok((model.clone(), metadata.clone())),
        _ => bail!("either --dir or both --model and --metadata are required"),
    }
}

async fn load_classifier(args: &Args) -> Result<Classifier> {
    let (model, metadata) = locations(args)?;
    if args.fresh && is_remote(&model) {
        info!("Fresh download requested - removing cached copy of {}", model);
        ModelManager::new_default()?.remove(&model)?;
    }

    let config = RuntimeConfig {
        intra_threads: args.threads,
        ..RuntimeConfig::default()
    };
    Ok(Classifier::load_with_config(&model, metadata, config).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("=== Starting Image Classifier ===");
    let start_time = Instant::now();

    let classifier = load_classifier(&args).await?;
    let classifier_info = classifier.info();
    info!(
        "Loaded '{}' with {} classes in {:.2?}",
        classifier_info.model_name,
        classifier_info.num_classes,
        start_time.elapsed()
    );

    let classify_start = Instant::now();
    for path in &args.images {
        let image = image::open(path).with_context(|| format!("failed to open image {}", path))?;
        let predictions =
            classifier.predict_top_k(&ImageSource::Image(&image), args.top_k, args.flipped)?;

        println!("\n{}:", path);
        for prediction in predictions {
            println!("  {}: {:.1}%", prediction.class_name, prediction.probability * 100.0);
        }
    }

    let classify_time = classify_start.elapsed();
    info!("=== Done ===");
    info!("Classification time: {:.2?}", classify_time);
    info!(
        "Average time per image: {:.2?}",
        classify_time / args.images.len().max(1) as u32
    );

    classifier.dispose();
    Ok(())
}
