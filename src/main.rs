use std::sync::Arc;
use std::time::Duration;

use lead_funnel::cli::CliChat;
use lead_funnel::config::FunnelConfig;
use lead_funnel::funnel::FunnelEngine;
use lead_funnel::integrations::Integrations;

const OUTBOUND_DRAIN_LIMIT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so the chat on stdout stays readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (config, script) = FunnelConfig::load_from_env()?;

    eprintln!("💬 Lead Funnel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Steps: {}", script.len());
    eprintln!("   WhatsApp: {}", config.link.destination_number);
    eprintln!(
        "   Script: {}",
        config
            .script_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );
    eprintln!("   Ctrl-D to quit.\n");

    let integrations = Integrations::from_config(config.waseller.clone(), config.pixel.clone());
    let engine = Arc::new(FunnelEngine::new(
        script,
        config.link.clone(),
        config.delays,
        integrations.clone(),
    ));

    CliChat::new(engine).run().await;

    // Let in-flight lead and pixel requests finish before the runtime exits.
    integrations.drain(OUTBOUND_DRAIN_LIMIT).await;
    Ok(())
}
