#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Config, ConfigError, OpenAiConfig, RetrievalConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Alignment Search Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Model Service").bold().yellow());
    eprintln!("Configure the OpenAI-compatible service used for embeddings and completions.");
    eprintln!();

    configure_openai(&mut config.openai)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    configure_retrieval(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_openai_connection(&config.openai, config.api_key.as_deref()) {
        eprintln!("{}", style("✓ Model service reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the model service").yellow()
        );
        eprintln!(
            "You can continue, but set {} before searching.",
            super::settings::API_KEY_ENV
        );
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
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Model Service:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.openai.base_url).cyan());
    eprintln!(
        "  Embedding model: {} ({} dims)",
        style(&config.openai.embedding_model).cyan(),
        config.openai.embedding_dimension
    );
    eprintln!(
        "  Completion model: {}",
        style(&config.openai.completion_model).cyan()
    );
    eprintln!("  Timeout: {}s", style(config.openai.timeout_secs).cyan());
    eprintln!("  API key: {}", style(mask_api_key(config.api_key.as_deref())).cyan());

    eprintln!();
    eprintln!("{}", style("Retry:").bold().yellow());
    eprintln!(
        "  Attempts: {}, wait cap: {}s",
        style(config.retry.max_attempts).cyan(),
        style(config.retry.max_wait_secs).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Default k: {} (max {})",
        style(config.retrieval.default_k).cyan(),
        config.retrieval.max_k
    );
    eprintln!("  HyDE by default: {}", style(config.retrieval.hyde).cyan());
    eprintln!("  Corpus: {}", style(config.corpus_path().display()).cyan());
    eprintln!("  Server bind: {}", style(&config.server.bind).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn mask_api_key(key: Option<&str>) -> String {
    match key {
        None => "not set".to_string(),
        Some(key) if key.chars().count() <= 8 => "****".to_string(),
        Some(key) => {
            let tail: String = key
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{}", tail)
        }
    }
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                api_key: std::env::var(super::settings::API_KEY_ENV).ok(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_openai(openai: &mut OpenAiConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(openai.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OpenAiConfig {
                base_url: input.clone(),
                ..OpenAiConfig::default()
            };
            temp_config.base_url()?;
            Ok(())
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(openai.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(openai.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let completion_model: String = Input::new()
        .with_prompt("Completion model (used for HyDE)")
        .default(openai.completion_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    openai.set_base_url(base_url)?;
    openai.set_embedding_model(embedding_model)?;
    openai.set_embedding_dimension(embedding_dimension)?;
    openai.set_completion_model(completion_model)?;

    Ok(())
}

fn configure_retrieval(config: &mut Config) -> Result<()> {
    let corpus_path: String = Input::new()
        .with_prompt("Corpus snapshot path")
        .default(config.corpus.path.display().to_string())
        .validate_with(non_empty)
        .interact_text()?;

    let max_k = config.retrieval.max_k;
    let default_k: usize = Input::new()
        .with_prompt("Results per query")
        .default(config.retrieval.default_k)
        .validate_with(|input: &usize| -> Result<(), String> {
            if *input == 0 || *input > max_k {
                Err(format!("Must be between 1 and {}", max_k))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let hyde = Confirm::new()
        .with_prompt("Use HyDE query expansion by default?")
        .default(config.retrieval.hyde)
        .interact()?;

    config.corpus.path = PathBuf::from(corpus_path);
    set_retrieval(&mut config.retrieval, default_k, hyde)?;
    Ok(())
}

fn set_retrieval(
    retrieval: &mut RetrievalConfig,
    default_k: usize,
    hyde: bool,
) -> Result<(), ConfigError> {
    retrieval.set_default_k(default_k)?;
    retrieval.hyde = hyde;
    Ok(())
}

fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Value cannot be empty")
    } else {
        Ok(())
    }
}

fn test_openai_connection(openai: &OpenAiConfig, api_key: Option<&str>) -> bool {
    let Ok(base) = openai.base_url() else {
        return false;
    };
    let url = format!("{}/models", base.as_str().trim_end_matches('/'));

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .into();

    let mut request = agent.get(&url);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key.trim()));
    }

    match request.call() {
        Ok(_) => true,
        // reachable, just unauthenticated
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
