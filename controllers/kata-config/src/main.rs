//! KataConfig Controller
//!
//! Rolls the Kata sandboxed container runtime onto worker nodes through the
//! machine config operator, registers its RuntimeClasses and, for peer
//! pods, builds the pod VM image. Deleting the KataConfig reverses all of it.

mod config;
mod controller;
mod error;
mod events;
mod feature_gates;
mod image;
mod machine_config;
mod monitor;
mod pool;
mod reconciler;
mod runtime_class;
mod selector;
mod status;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Failed to install the rustls crypto provider: {:?}", e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting KataConfig Controller");

    let config = OperatorConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace);
    info!("  Job templates: {}", config.template_dir.display());
    info!("  Builder image: {}", config.builder_image.as_deref().unwrap_or("from templates"));
    info!("  Requeue interval: {:?}", config.requeue_interval);

    let controller = Controller::new(config).await.inspect_err(|e| {
        error!("Failed to start controller: {}", e);
    })?;
    controller.run().await?;

    Ok(())
}
