use anyhow::{Context, Result};
use console::style;
use tracing::{info, warn};

use crate::RagError;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::index::IndexStore;

/// Start the HTTP server, optionally overriding the configured address
#[inline]
pub async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    let client = OllamaClient::new(&config.ollama)?;
    let probe = client.clone();
    match tokio::task::spawn_blocking(move || probe.health_check()).await? {
        Ok(()) => info!(
            "Ollama ready at {} (embedding: {}, generation: {})",
            client.base_url(),
            config.ollama.embedding_model,
            config.ollama.generation_model
        ),
        Err(e) => {
            warn!("Ollama is not ready: {:#}", e);
            eprintln!(
                "{} Ollama at {} is not ready, uploads and questions will fail until it is",
                style("Warning:").yellow().bold(),
                client.base_url()
            );
        }
    }

    crate::server::serve(&config).await
}

/// Print the effective configuration
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  Embedding model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!(
        "  Generation model: {}",
        style(&config.ollama.generation_model).cyan()
    );
    eprintln!("  Batch size: {}", style(config.ollama.batch_size).cyan());
    eprintln!(
        "  Timeout: {}s, {} attempts",
        style(config.ollama.timeout_seconds).cyan(),
        style(config.ollama.retry_attempts).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Chunk size: {} chars, overlap {}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    eprintln!("  Top k: {}", style(config.retrieval.top_k).cyan());

    eprintln!();
    eprintln!("{}", style("Sessions:").bold().yellow());
    if config.session.ttl_seconds == 0 {
        eprintln!("  Idle expiry: {}", style("never").cyan());
    } else {
        eprintln!(
            "  Idle expiry: {}s",
            style(config.session.ttl_seconds).cyan()
        );
    }
    eprintln!(
        "  Max sessions: {}",
        style(config.session.max_sessions).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!(
        "  Listen: {}:{}",
        style(&config.server.host).cyan(),
        style(config.server.port).cyan()
    );
    eprintln!(
        "  Upload limit: {} bytes",
        style(config.server.max_upload_bytes).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!("Index: {}", style(config.index_path().display()).dim());

    Ok(())
}

/// Write the effective configuration to the config file
#[inline]
pub fn write_config(config: &Config) -> Result<()> {
    config.save()?;
    eprintln!(
        "{} Configuration written to {}",
        style("✓").green(),
        config.config_file_path().display()
    );
    Ok(())
}

/// Verify Ollama and report on the saved index
#[inline]
pub async fn check(config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama)?;
    let url = client.base_url().clone();

    tokio::task::spawn_blocking(move || client.health_check())
        .await?
        .with_context(|| format!("Ollama at {} failed its health check", url))?;
    eprintln!(
        "{} Ollama at {} serves {} and {}",
        style("✓").green(),
        url,
        config.ollama.embedding_model,
        config.ollama.generation_model
    );

    let store = IndexStore::new(config.index_path());
    match store.manifest() {
        Ok(manifest) => {
            eprintln!(
                "{} Saved index: {} chunks, {} dimensions, built {} with {}",
                style("✓").green(),
                manifest.chunk_count,
                manifest.dimension,
                manifest.created_at.format("%Y-%m-%d %H:%M:%S"),
                manifest.embedding_model
            );
            if manifest.embedding_model != config.ollama.embedding_model {
                eprintln!(
                    "{} The saved index was built with {}, questions will be refused until a document is uploaded again",
                    style("Warning:").yellow().bold(),
                    manifest.embedding_model
                );
            }
        }
        Err(RagError::NotFound(_)) => {
            eprintln!(
                "{} No saved index yet, upload a document to create one",
                style("-").dim()
            );
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
