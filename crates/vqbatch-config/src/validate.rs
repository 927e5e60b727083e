//! Validation helpers for configuration documents.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{BackendSettings, PipelineSettings, RunnerConfig, TelemetrySettings};

const LOG_FORMATS: &[&str] = &["pretty", "json"];

pub(crate) fn validate_config(config: &RunnerConfig) -> ConfigResult<()> {
    validate_pipeline(&config.pipeline)?;
    validate_backend(&config.backend)?;
    validate_telemetry(&config.telemetry)
}

fn validate_pipeline(settings: &PipelineSettings) -> ConfigResult<()> {
    ensure_path("pipeline", "log_file_dir", &settings.log_file_dir)?;
    ensure_path("pipeline", "workdir_root", &settings.workdir_root)?;

    if settings.max_concurrency == 0 {
        return Err(ConfigError::invalid(
            "pipeline",
            "max_concurrency",
            "must_be_positive",
            Some("0".to_string()),
        ));
    }

    if settings.backend_timeout_secs == Some(0) {
        return Err(ConfigError::invalid(
            "pipeline",
            "backend_timeout_secs",
            "must_be_positive",
            Some("0".to_string()),
        ));
    }

    Ok(())
}

fn validate_backend(settings: &BackendSettings) -> ConfigResult<()> {
    ensure_identity_token("executor_type", &settings.executor_type)?;
    ensure_identity_token("executor_version", &settings.executor_version)?;
    ensure_path("backend", "program", &settings.program)
}

fn validate_telemetry(settings: &TelemetrySettings) -> ConfigResult<()> {
    if settings.log_level.trim().is_empty() {
        return Err(ConfigError::invalid(
            "telemetry",
            "log_level",
            "empty",
            None,
        ));
    }

    if let Some(format) = settings.log_format.as_deref()
        && !LOG_FORMATS.contains(&format)
    {
        return Err(ConfigError::invalid(
            "telemetry",
            "log_format",
            "unsupported",
            Some(format.to_string()),
        ));
    }

    Ok(())
}

fn ensure_path(section: &'static str, field: &'static str, path: &Path) -> ConfigResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::invalid(section, field, "empty", None));
    }
    Ok(())
}

/// Executor type and version end up as path segments, so they are limited to
/// a conservative character set.
pub(crate) fn ensure_identity_token(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(ConfigError::invalid("backend", field, "empty", None));
    }

    let valid = value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));
    if !valid || value == "." || value == ".." {
        return Err(ConfigError::invalid(
            "backend",
            field,
            "invalid_characters",
            Some(value.to_string()),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_config() -> RunnerConfig {
        RunnerConfig {
            pipeline: PipelineSettings::new("/logs", "/work"),
            backend: BackendSettings {
                executor_type: "VMAF".to_string(),
                executor_version: "0.3.1".to_string(),
                program: PathBuf::from("/usr/bin/vmaf"),
                args: Vec::new(),
            },
            telemetry: TelemetrySettings::default(),
        }
    }

    #[test]
    fn validate_accepts_sample_config() {
        assert!(validate_config(&sample_config()).is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = sample_config();
        config.pipeline.max_concurrency = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "max_concurrency",
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = sample_config();
        config.pipeline.backend_timeout_secs = Some(0);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidField {
                field: "backend_timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_empty_log_dir() {
        let mut config = sample_config();
        config.pipeline.log_file_dir = PathBuf::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidField {
                section: "pipeline",
                field: "log_file_dir",
                reason: "empty",
                ..
            })
        ));
    }

    #[test]
    fn identity_tokens_reject_path_separators() {
        assert!(ensure_identity_token("executor_type", "VMAF").is_ok());
        assert!(ensure_identity_token("executor_version", "0.3.1-rc_2").is_ok());
        assert!(ensure_identity_token("executor_type", "").is_err());
        assert!(ensure_identity_token("executor_type", "a/b").is_err());
        assert!(ensure_identity_token("executor_type", "..").is_err());
        assert!(ensure_identity_token("executor_version", "1 2").is_err());
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = sample_config();
        config.telemetry.log_format = Some("xml".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidField {
                field: "log_format",
                ..
            })
        ));
    }
}
