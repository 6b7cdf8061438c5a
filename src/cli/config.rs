//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::channel::MethodCall;
use crate::config::EditorConfig;
use crate::dispatcher::params;
use anyhow::{Context, Result};

/// Convert CLI arguments to an [`EditorConfig`] and a channel call
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Config file (if any) with command-line overrides applied on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<EditorConfig> {
        let mut config = match &cli.config {
            Some(path) => EditorConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))?,
            None => EditorConfig::default(),
        };

        if let Some(assets) = &cli.assets {
            config.assets_dir.clone_from(assets);
        }
        if let Some(output_dir) = &cli.output_dir {
            config.output_dir.clone_from(output_dir);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// The method call the CLI invocation describes
    pub(crate) fn method_call(cli: &Cli) -> MethodCall {
        let mut call = MethodCall::new(cli.operation.clone());
        if let Some(image) = &cli.image {
            call = call.with_argument(params::IMAGE_PATH, image.clone());
        }
        if let Some(filter) = &cli.filter {
            call = call.with_argument(params::FILTER_TYPE, filter.clone());
        }
        for (key, value) in &cli.params {
            call = call.with_argument(key.clone(), value.clone());
        }
        call
    }
}

/// Parse a `key=value` pair
pub(crate) fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
