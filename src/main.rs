//! ndots-webhook - Kubernetes mutating admission webhook for Pod DNS ndots

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::Client;
use tracing::{info, warn};

use ndots_webhook::config::Config;
use ndots_webhook::manifest::{self, ManifestOptions};
use ndots_webhook::metrics::WebhookMetrics;
use ndots_webhook::mutation::{
    KubeNamespaceLookup, MutationEngine, NamespaceLookup, StaticNamespaceLookup,
};
use ndots_webhook::server::{self, ServerConfig};
use ndots_webhook::telemetry::init_logging;
use ndots_webhook::webhook::WebhookState;

/// ndots-webhook - injects the ndots DNS option into Pods at admission
#[derive(Parser, Debug)]
#[command(name = "ndots-webhook", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the admission webhook and metrics servers (default mode)
    Serve,

    /// Print the MutatingWebhookConfiguration for this webhook and exit
    Manifest(ManifestOptions),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Manifest(options)) => {
            cli.config.validate()?;
            let engine = MutationEngine::new(&cli.config.engine_config())?;
            print!("{}", manifest::render(&options, engine.namespace_filter())?);
            Ok(())
        }
        Some(Commands::Serve) | None => run_webhook(cli.config).await,
    }
}

/// Start the webhook with the given configuration
async fn run_webhook(config: Config) -> anyhow::Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install crypto provider: {:?}", e))?;

    init_logging(&config.log_config())?;
    config.validate()?;
    config.log();

    let engine = MutationEngine::new(&config.engine_config())?;
    let lookup = namespace_lookup(&config).await;
    let state = Arc::new(WebhookState::new(
        engine,
        lookup,
        Arc::new(WebhookMetrics::new()?),
    ));

    server::run(ServerConfig::from(&config), state).await?;
    info!("webhook stopped");
    Ok(())
}

/// Namespace annotations come from the cluster when a client is available
async fn namespace_lookup(config: &Config) -> Arc<dyn NamespaceLookup> {
    match Client::try_default().await {
        Ok(client) => Arc::new(KubeNamespaceLookup::new(client, config.timeout())),
        Err(e) => {
            warn!(
                error = %e,
                "Failed to create Kubernetes client, namespace annotations will not be available"
            );
            Arc::new(StaticNamespaceLookup::new())
        }
    }
}
