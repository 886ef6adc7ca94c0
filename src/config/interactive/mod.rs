
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::settings::check_chunk_fits_input;
use super::{Config, ConfigError, EmbeddingConfig, EmbeddingProvider};
use crate::chunking::ChunkingConfig;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 D&D Books MCP Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Embedding Configuration").bold().yellow());
    eprintln!("Choose how passages and queries are turned into vectors.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Chunking Configuration").bold().yellow());
    configure_chunking(&mut config.chunking, config.embedding.max_input_tokens)?;

    eprintln!();
    let top_k: usize = Input::new()
        .with_prompt("Default number of passages per query")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err(ConfigError::InvalidTopK(*input))
            }
        })
        .interact_text()?;
    config.retrieval.top_k = top_k;

    if config.embedding.provider == EmbeddingProvider::Ollama {
        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        if test_ollama_connection(&config.embedding) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before building the index.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
        eprintln!(
            "{}",
            style("Rebuild the index if you changed the model, dimension or chunking.").dim()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Provider: {}", style(config.embedding.provider).cyan());
    if config.embedding.provider == EmbeddingProvider::Ollama {
        match config.ollama_url() {
            Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
            Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
        }
        eprintln!("  Model: {}", style(&config.embedding.model).cyan());
        eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    }
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());

    eprintln!();
    eprintln!("{}", style("Chunking Settings:").bold().yellow());
    eprintln!(
        "  Max Chunk Size: {} characters",
        style(config.chunking.max_chunk_size).cyan()
    );
    eprintln!(
        "  Overlap: {} characters",
        style(config.chunking.overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Corpus Directory: {}",
        style(config.corpus_dir().display()).cyan()
    );
    eprintln!("  Index File: {}", style(config.index_path().display()).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config::with_base_dir(config_dir))
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let providers = &["ollama", "hash"];
    let default_provider = usize::from(embedding.provider == EmbeddingProvider::Hash);

    let provider_index = Select::new()
        .with_prompt("Embedding provider")
        .default(default_provider)
        .items(providers)
        .interact()?;

    embedding.provider = if provider_index == 1 {
        EmbeddingProvider::Hash
    } else {
        EmbeddingProvider::Ollama
    };

    if embedding.provider == EmbeddingProvider::Ollama {
        configure_ollama(embedding)?;
    }

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (8..=8192).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 8 and 8192")
            }
        })
        .interact_text()?;

    embedding.set_dimension(dimension)?;

    Ok(())
}

fn configure_ollama(embedding: &mut EmbeddingConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == embedding.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(embedding.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let mut candidate = EmbeddingConfig {
                protocol: protocol.clone(),
                ..EmbeddingConfig::default()
            };
            candidate.set_host(input.clone())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(embedding.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(embedding.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.set_protocol(protocol)?;
    embedding.set_host(host)?;
    embedding.set_port(port)?;
    embedding.set_model(model)?;
    embedding.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_chunking(chunking: &mut ChunkingConfig, max_input_tokens: usize) -> Result<()> {
    let max_chunk_size: usize = Input::new()
        .with_prompt("Maximum passage size (characters)")
        .default(chunking.max_chunk_size)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            if (100..=16384).contains(input) {
                check_chunk_fits_input(*input, max_input_tokens)
            } else {
                Err(ConfigError::InvalidMaxChunkSize(*input))
            }
        })
        .interact_text()?;

    let overlap: usize = Input::new()
        .with_prompt("Overlap between consecutive passages (characters)")
        .default(chunking.overlap.min(max_chunk_size - 1))
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            if *input < max_chunk_size {
                Ok(())
            } else {
                Err(ConfigError::OverlapTooLarge(*input, max_chunk_size))
            }
        })
        .interact_text()?;

    chunking.max_chunk_size = max_chunk_size;
    chunking.overlap = overlap;

    Ok(())
}

fn test_ollama_connection(embedding: &EmbeddingConfig) -> bool {
    let Ok(base_url) = embedding.ollama_url() else {
        return false;
    };
    let Ok(url) = base_url.join("/api/version") else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
