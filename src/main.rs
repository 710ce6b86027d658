use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rag_qa::commands::{check, serve, show_config, write_config};
use rag_qa::config::Config;

#[derive(Parser)]
#[command(name = "rag-qa")]
#[command(about = "Ask questions about an uploaded PDF, answered by a local Ollama model")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the saved index [default: ~/.rag-qa]
    #[arg(long, global = true, env = "RAG_QA_DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to listen on, overriding the config file
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write the current configuration to disk, or show it
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Check that Ollama is reachable and both models are available
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()?,
    };
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Serve { host, port } => {
            serve(config, host, port).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                write_config(&config)?;
            }
        }
        Commands::Check => {
            check(&config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn serve_without_overrides() {
        let cli = Cli::try_parse_from(["rag-qa", "serve"]).expect("should parse");

        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, None);
                assert_eq!(port, None);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn serve_with_overrides() {
        let cli = Cli::try_parse_from(["rag-qa", "serve", "--host", "0.0.0.0", "--port", "9000"])
            .expect("should parse");

        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn base_dir_is_global() {
        let cli = Cli::try_parse_from(["rag-qa", "check", "--base-dir", "/tmp/rag"])
            .expect("should parse");

        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/rag")));
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["rag-qa", "config", "--show"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config { show: true }));

        let cli = Cli::try_parse_from(["rag-qa", "config"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config { show: false }));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = Cli::try_parse_from(["rag-qa", "serve", "--port", "not-a-port"]);
        assert!(matches!(result, Err(e) if e.kind() == ErrorKind::ValueValidation));
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        let result = Cli::try_parse_from(["rag-qa"]);
        assert!(result.is_err());
    }
}
