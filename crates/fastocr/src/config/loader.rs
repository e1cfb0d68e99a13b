use std::path::{Path, PathBuf};

use tokio::sync::Semaphore;

use crate::config::schema::Settings;
use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "FASTOCR_";

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_json::from_str(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// `<config dir>/fastocr/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fastocr").join("config.json"))
}

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let fail = |message: &str| {
        Err(ConfigError::Validation {
            message: message.to_string(),
        })
    };

    if settings.ocr_command.trim().is_empty() {
        return fail("ocr_command must not be empty");
    }
    if settings.max_ocr_process == 0 {
        return fail("max_ocr_process must be at least 1");
    }
    if settings.max_ocr_process > Semaphore::MAX_PERMITS {
        return Err(ConfigError::Validation {
            message: format!(
                "max_ocr_process must be at most {}",
                Semaphore::MAX_PERMITS
            ),
        });
    }
    if settings.document_expire_hours == 0 {
        return fail("document_expire_hours must be at least 1");
    }
    if settings.sweep_interval_secs == 0 {
        return fail("sweep_interval_secs must be at least 1");
    }
    if settings.workdir.as_os_str().is_empty() {
        return fail("workdir must not be empty");
    }

    Ok(())
}

impl Settings {
    /// Overrides fields from `FASTOCR_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Same as [`Settings::apply_env`] with a custom variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            let name = format!("{}{}", ENV_PREFIX, key);
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, value)) = var("BASE_DIR") {
            self.base_dir = PathBuf::from(value);
        }
        if let Some((_, value)) = var("WORKDIR") {
            self.workdir = PathBuf::from(value);
        }
        if let Some((_, value)) = var("OCR_COMMAND") {
            self.ocr_command = value;
        }
        if let Some((_, value)) = var("OCR_OPTIONS") {
            self.ocr_options = value.split_whitespace().map(str::to_string).collect();
        }
        if let Some((name, value)) = var("MAX_OCR_PROCESS") {
            self.max_ocr_process = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = var("DOCUMENT_EXPIRE_HOURS") {
            self.document_expire_hours = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = var("SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = var("ENABLE_WSL_COMPAT") {
            self.enable_wsl_compat = parse_bool(&name, &value)?;
        }
        if let Some((name, value)) = var("LOG_JSON") {
            self.log_json = parse_bool(&name, &value)?;
        }

        validate_settings(self)
    }

    /// Makes `base_dir` and `workdir` absolute and creates the work directory.
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        self.base_dir = std::fs::canonicalize(&self.base_dir).map_err(|e| {
            ConfigError::Validation {
                message: format!("base_dir '{}': {}", self.base_dir.display(), e),
            }
        })?;

        let workdir = if self.workdir.is_relative() {
            self.base_dir.join(&self.workdir)
        } else {
            self.workdir.clone()
        };
        std::fs::create_dir_all(&workdir).map_err(|e| ConfigError::CreateWorkdir {
            path: workdir.clone(),
            source: e,
        })?;
        self.workdir = std::fs::canonicalize(&workdir).map_err(|e| {
            ConfigError::CreateWorkdir {
                path: workdir.clone(),
                source: e,
            }
        })?;

        if !self.workdir.starts_with(&self.base_dir) {
            return Err(ConfigError::Validation {
                message: format!(
                    "workdir '{}' must be inside base_dir '{}'",
                    self.workdir.display(),
                    self.base_dir.display()
                ),
            });
        }

        Ok(self)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_empty_object_uses_defaults() {
        let settings = load_settings_from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_ocr_process, 1);
        assert_eq!(settings.ttl(), chrono::Duration::hours(1));
        assert_eq!(settings.sweep_interval().as_secs(), 60);
        assert_eq!(settings.ocr_options[0], "--output-type");
    }

    #[test]
    fn test_load_partial_settings() {
        let settings = load_settings_from_str(
            r#"{
                "workdir": "jobs",
                "max_ocr_process": 4,
                "document_expire_hours": 6,
                "ocr_options": []
            }"#,
        )
        .unwrap();
        assert_eq!(settings.workdir, PathBuf::from("jobs"));
        assert_eq!(settings.max_ocr_process, 4);
        assert_eq!(settings.ttl(), chrono::Duration::hours(6));
        assert!(settings.ocr_options.is_empty());
        assert_eq!(settings.ocr_command, "/usr/local/bin/ocrmypdf");
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let err = load_settings_from_str(r#"{"max_ocr_process": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_parallelism_above_semaphore_limit_rejected() {
        let settings = Settings {
            max_ocr_process: Semaphore::MAX_PERMITS + 1,
            ..Settings::default()
        };
        match validate_settings(&settings) {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("max_ocr_process"))
            }
            other => panic!("Expected Validation, got {:?}", other),
        }

        let at_limit = Settings {
            max_ocr_process: Semaphore::MAX_PERMITS,
            ..Settings::default()
        };
        assert!(validate_settings(&at_limit).is_ok());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = load_settings_from_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_settings("/nonexistent/fastocr.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_apply_env_from_map() {
        let vars: HashMap<&str, &str> = [
            ("FASTOCR_MAX_OCR_PROCESS", "3"),
            ("FASTOCR_OCR_OPTIONS", "--output-type pdfa  --jobs 2"),
            ("FASTOCR_ENABLE_WSL_COMPAT", "yes"),
            ("FASTOCR_WORKDIR", "/data/ocr"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env_from(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.max_ocr_process, 3);
        assert_eq!(
            settings.ocr_options,
            vec!["--output-type", "pdfa", "--jobs", "2"]
        );
        assert!(settings.enable_wsl_compat);
        assert_eq!(settings.workdir, PathBuf::from("/data/ocr"));
    }

    #[test]
    fn test_apply_env_invalid_number() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env_from(|name| {
                (name == "FASTOCR_DOCUMENT_EXPIRE_HOURS").then(|| "soon".to_string())
            })
            .unwrap_err();
        match err {
            ConfigError::InvalidEnv { name, value } => {
                assert_eq!(name, "FASTOCR_DOCUMENT_EXPIRE_HOURS");
                assert_eq!(value, "soon");
            }
            other => panic!("Expected InvalidEnv, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_apply_env_reads_process_environment() {
        std::env::set_var("FASTOCR_SWEEP_INTERVAL_SECS", "15");
        let mut settings = Settings::default();
        let result = settings.apply_env();
        std::env::remove_var("FASTOCR_SWEEP_INTERVAL_SECS");

        result.unwrap();
        assert_eq!(settings.sweep_interval_secs, 15);
    }

    #[test]
    fn test_resolve_creates_workdir_under_base() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            base_dir: dir.path().to_path_buf(),
            workdir: PathBuf::from("nested/workdir"),
            ..Settings::default()
        }
        .resolve()
        .unwrap();

        assert!(settings.base_dir.is_absolute());
        assert!(settings.workdir.is_dir());
        assert!(settings.workdir.starts_with(&settings.base_dir));
    }

    #[test]
    fn test_resolve_rejects_workdir_outside_base() {
        let base = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let err = Settings {
            base_dir: base.path().to_path_buf(),
            workdir: other.path().to_path_buf(),
            ..Settings::default()
        }
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_default_config_path_shape() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("fastocr/config.json"));
        }
    }
}
