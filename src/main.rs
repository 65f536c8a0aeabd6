use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use paddy_disease_finder::logging::init_logger;
use paddy_disease_finder::{
    AppConfig, AppState, Args, ClassifierSettings, DiseaseClassifier, OnnxModel, Processor, TreatmentBook, router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let (config, source) = AppConfig::load(&args).context("Failed to load configuration")?;

    init_logger(&config.logging);
    info!("Paddy Disease Finder v{}", env!("CARGO_PKG_VERSION"));
    match &source {
        Some(path) => info!(config = %path.display(), "loaded config file"),
        None => info!("no config file found, using defaults"),
    }

    let labels = config.class_labels().context("Failed to load class labels")?;
    let treatments = TreatmentBook::with_overrides(&config.treatments);
    for label in treatments.missing_for(&labels) {
        warn!(label, "no treatment tips for label");
    }

    // Load model once
    let model = OnnxModel::load(&config.model.path, config.model.cuda)
        .with_context(|| format!("Failed to load model {}", config.model.path.display()))?;
    let settings = ClassifierSettings {
        threshold: config.model.confidence_threshold,
        output: config.model.output,
        saliency: config.saliency.clone(),
    };
    let classifier = DiseaseClassifier::new(
        Box::new(model),
        Processor::new(config.preprocess.clone()),
        labels,
        settings,
    )?;
    info!(
        threshold = classifier.threshold(),
        saliency = config.saliency.enabled,
        labels = ?classifier.labels().iter().collect::<Vec<_>>(),
        "classifier ready"
    );

    let state = Arc::new(AppState::new(
        classifier,
        treatments,
        config.model.path.display().to_string(),
        config.server.max_upload_bytes,
    ));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.server.host, config.server.port))?;
    info!("Starting server on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}
