//! YAML configuration loading with environment interpolation.
//!
//! # Design
//! - A single document describes one runner invocation; JSON documents are
//!   accepted as the YAML subset they are.
//! - `${VAR}` and `${VAR:-default}` placeholders are resolved before parsing;
//!   `$$` escapes a literal dollar sign.
//! - Validation runs after parsing so callers only ever see checked configs.

use std::env;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::RunnerConfig;
use crate::validate::validate_config;

static ENV_VAR_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}"));

const SUPPORTED_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Outcome of placeholder interpolation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpolation {
    /// Document text with placeholders substituted.
    pub text: String,
    /// One message per placeholder that could not be resolved.
    pub errors: Vec<String>,
}

impl Interpolation {
    /// Whether every placeholder resolved.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Load, interpolate, parse, and validate the configuration file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has an unsupported extension,
/// references unset variables, fails to parse, or fails validation.
pub fn load_from_path(path: &Path) -> ConfigResult<RunnerConfig> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    if !supported {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded configuration file");
    parse_yaml(&contents)
}

/// Interpolate, parse, and validate a configuration document.
///
/// # Errors
///
/// Returns an error if interpolation, parsing, or validation fails.
pub fn parse_yaml(contents: &str) -> ConfigResult<RunnerConfig> {
    let interpolated = interpolate(contents);
    if !interpolated.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            errors: interpolated.errors,
        });
    }

    let config: RunnerConfig = serde_yaml::from_str(&interpolated.text)
        .map_err(|source| ConfigError::Parse { source })?;
    validate_config(&config)?;
    Ok(config)
}

/// Resolve placeholders against the process environment.
#[must_use]
pub fn interpolate(input: &str) -> Interpolation {
    interpolate_with(input, |name| env::var(name).ok())
}

/// Resolve placeholders against an arbitrary lookup.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Interpolation
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = match ENV_VAR_PATTERN.as_ref() {
        Ok(pattern) => pattern,
        Err(err) => {
            return Interpolation {
                text: input.to_string(),
                errors: vec![format!("placeholder pattern failed to compile: {err}")],
            };
        }
    };
    let mut errors = Vec::new();

    let text = pattern
        .replace_all(input, |caps: &Captures<'_>| {
            let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                return "$".to_string();
            };
            let default_value = caps.get(2).map(|m| m.as_str());
            let placeholder = caps.get(0).map_or("", |m| m.as_str()).to_string();

            match (lookup(name), default_value) {
                (Some(value), _) if value.contains('\n') || value.contains('\r') => {
                    errors.push(format!(
                        "environment variable '{name}' contains newlines, which is not allowed"
                    ));
                    placeholder
                }
                (Some(value), Some(default)) if value.is_empty() => default.to_string(),
                (Some(value), _) => value,
                (None, Some(default)) => default.to_string(),
                (None, None) => {
                    errors.push(format!("environment variable '{name}' is not set"));
                    placeholder
                }
            }
        })
        .into_owned();

    Interpolation { text, errors }
}
