//! AgroVision CLI
//!
//! Resolves the trained leaf classifier once at startup and classifies
//! images given on the command line.

use agrovision_classifier::{ClassifierEngine, EngineConfig, OnnxLoader, Resolution};
use agrovision_classifier::{ArtifactResolver, AttemptOutcome, VocabularyFit};
use agrovision_core::ClassificationResult;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod cli;
mod upload;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    describe_metrics();

    let config = load_config(cli.config.as_deref(), cli.model_dir.clone())?;
    let resolution = resolve(&config);

    match cli.command {
        Commands::Resolve => {
            print_resolution(&resolution);
            let engine = ClassifierEngine::from_resolution(resolution, config.top_k);
            print_engine(&engine);
            Ok(())
        }
        Commands::Classify { images, json } => {
            let engine = Arc::new(ClassifierEngine::from_resolution(resolution, config.top_k));
            if !engine.is_enabled() {
                warn!("No model loaded; every image will be reported as unavailable");
            }
            classify_all(&engine, &images, Duration::from_millis(cli.timeout_ms), json).await
        }
    }
}

/// Load the engine configuration, applying the `--model-dir` override
fn load_config(path: Option<&Path>, model_dir: Option<PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    Ok(match model_dir {
        Some(dir) => config.with_model_dir(dir),
        None => config,
    })
}

fn resolve(config: &EngineConfig) -> Resolution {
    info!("Resolving classifier artifacts...");
    let loader = OnnxLoader::new(config.device.to_device_type());
    ArtifactResolver::new(config, &loader).resolve()
}

fn print_resolution(resolution: &Resolution) {
    println!("Model candidates:");
    for attempt in &resolution.attempts {
        let status = match &attempt.outcome {
            AttemptOutcome::Missing => "missing".to_string(),
            AttemptOutcome::Failed(reason) => format!("failed: {}", reason),
            AttemptOutcome::Loaded => "loaded".to_string(),
        };
        println!("  {} ({})", attempt.path.display(), status);
    }
}

fn print_engine(engine: &ClassifierEngine) {
    match (engine.model_path(), engine.head()) {
        (Some(path), Some(head)) => {
            println!("Model: {}", path.display());
            println!("Head: {}", head);
        }
        _ => println!("Model: none (image prediction disabled)"),
    }

    println!("Vocabulary: {:?} ({} labels)", engine.vocabulary().source(), engine.vocabulary().len());
    if let Some(fit) = engine.vocabulary_fit() {
        println!("Fit: {}", describe_fit(fit));
    }
}

fn describe_fit(fit: VocabularyFit) -> String {
    match fit {
        VocabularyFit::Matched => "matched".to_string(),
        VocabularyFit::Placeholder { expected, found } => format!(
            "placeholder labels in use (model needs {}, vocabulary had {})",
            expected, found
        ),
        VocabularyFit::Mismatched { expected, found } => format!(
            "labels kept (model needs {}, vocabulary has {})",
            expected, found
        ),
    }
}

/// One line of `classify` output
#[derive(Debug, Serialize)]
struct ImageReport {
    file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ClassificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ImageReport {
    fn success(file: &Path, result: ClassificationResult) -> Self {
        Self {
            file: file.to_path_buf(),
            label: Some(result.label.clone()),
            confidence: Some(result.confidence_percent()),
            result: Some(result),
            error: None,
        }
    }

    fn failure(file: &Path, error: impl ToString) -> Self {
        Self {
            file: file.to_path_buf(),
            label: None,
            confidence: None,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

async fn classify_all(
    engine: &Arc<ClassifierEngine>,
    images: &[PathBuf],
    timeout: Duration,
    json: bool,
) -> Result<()> {
    let mut failures = 0usize;

    for path in images {
        let report = match upload::read_upload(path) {
            Ok(bytes) => match engine.classify_with_timeout(bytes, timeout).await {
                Ok(result) => ImageReport::success(path, result),
                Err(e) => ImageReport::failure(path, e),
            },
            Err(e) => ImageReport::failure(path, e),
        };

        if report.error.is_some() {
            failures += 1;
        }
        print_report(&report, json)?;
    }

    if failures > 0 {
        anyhow::bail!("{} of {} images could not be classified", failures, images.len());
    }
    Ok(())
}

fn print_report(report: &ImageReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    match (&report.result, &report.error) {
        (Some(result), _) => println!("{}: {}", report.file.display(), result),
        (None, Some(error)) => println!("{}: error: {}", report.file.display(), error),
        (None, None) => {}
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("agrovision=debug,agrovision_classifier=debug,agrovision_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("agrovision=info,agrovision_classifier=info,agrovision_cli=info")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Register metric descriptions; no exporter is installed
fn describe_metrics() {
    metrics::describe_counter!(
        "agrovision_classifications_total",
        "Total number of classifications by verdict"
    );
    metrics::describe_counter!(
        "agrovision_classification_errors_total",
        "Total number of failed classifications by error kind"
    );
    metrics::describe_histogram!(
        "agrovision_inference_latency_us",
        metrics::Unit::Microseconds,
        "Model forward pass latency in microseconds"
    );
}
