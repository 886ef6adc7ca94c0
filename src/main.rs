use clap::{Parser, Subcommand};
use dnd_books_mcp::Result;
use dnd_books_mcp::commands::{build_index, search, serve_mcp, show_status};
use dnd_books_mcp::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dnd-books-mcp")]
#[command(about = "Semantic search over a personal library of D&D rulebooks, served over MCP")]
#[command(version)]
struct Cli {
    /// Base directory holding config.toml, the corpus and the index
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding backend, chunking and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk and embed the corpus, then write the index
    Build {
        /// Directory of extracted .txt rulebooks (defaults to the configured corpus)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Query the index from the command line
    Search {
        /// Natural language query
        query: String,
        /// Number of passages to return
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        k: Option<u64>,
    },
    /// Start MCP server on stdio
    Serve,
    /// Show corpus, embedder and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Build { corpus } => {
            build_index(&config_dir, corpus)?;
        }
        Commands::Search { query, k } => {
            let k = k.map(usize::try_from).transpose().map_err(anyhow::Error::from)?;
            search(&config_dir, &query, k)?;
        }
        Commands::Serve => {
            serve_mcp(&config_dir).await?;
        }
        Commands::Status => {
            show_status(&config_dir)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["dnd-books-mcp", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert!(parsed.config_dir.is_none());
        }
    }

    #[test]
    fn build_command_with_corpus() {
        let cli = Cli::try_parse_from(["dnd-books-mcp", "build", "--corpus", "/srv/books"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Build { corpus } = parsed.command {
                assert_eq!(corpus, Some(PathBuf::from("/srv/books")));
            }
        }
    }

    #[test]
    fn search_command_with_k() {
        let cli = Cli::try_parse_from(["dnd-books-mcp", "search", "opportunity attack", "-k", "3"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, k } = parsed.command {
                assert_eq!(query, "opportunity attack");
                assert_eq!(k, Some(3));
            }
        }
    }

    #[test]
    fn search_rejects_zero_k() {
        let cli = Cli::try_parse_from(["dnd-books-mcp", "search", "traps", "-k", "0"]);
        assert!(cli.is_err());
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["dnd-books-mcp", "serve", "--config-dir", "/tmp/dnd"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Serve));
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/dnd")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["dnd-books-mcp", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["dnd-books-mcp", "crawl"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["dnd-books-mcp", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
