//! Configuration loading

use std::env;
use std::fs;
use std::path::Path;

use kilowatch_core::{Error, Result};
use regex::Regex;

use crate::Config;

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(Error::Config(format!(
                "unsupported config format for '{}': expected .yaml, .toml, or .json",
                path.display()
            ))),
        }
    }
}

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    let format = ConfigFormat::from_path(path)?;

    load_from_str(&content, format)
}

/// Expand environment variables in configuration string
/// Supports syntax: ${VAR} and ${VAR:-default}
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::Config(format!("Invalid regex: {e}")))?;

    let mut result = String::new();
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let full_match = cap.get(0).unwrap();
        let var_name = cap.get(1).unwrap().as_str();
        let default_value = cap.get(3).map(|m| m.as_str());

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&resolve_placeholder(var_name, default_value)?);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

fn resolve_placeholder(name: &str, default: Option<&str>) -> Result<String> {
    match env::var(name) {
        Ok(value) => Ok(value),
        Err(_) => default.map(str::to_string).ok_or_else(|| {
            Error::Config(format!(
                "Environment variable '{name}' not set and no default provided"
            ))
        }),
    }
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    // Expand environment variables first
    let expanded_content = expand_env_vars(content)?;

    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(config)
}

/// Load and validate a configuration file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;

    crate::validator::validate_config(&config)?;

    tracing::debug!(
        targets = config.targets.len(),
        auth_groups = config.auth.groups.len(),
        "configuration loaded"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("kilowatch.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("kilowatch.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("kilowatch.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("kilowatch.json")).unwrap(),
            ConfigFormat::Json
        );
    }

    #[test]
    fn test_unsupported_format() {
        assert!(ConfigFormat::from_path(&PathBuf::from("kilowatch.txt")).is_err());
        assert!(ConfigFormat::from_path(&PathBuf::from("kilowatch")).is_err());
    }

    #[test]
    fn test_expand_env_vars_set() {
        env::set_var("KILOWATCH_TEST_PASS", "87654321");
        let expanded = expand_env_vars("pass: ${KILOWATCH_TEST_PASS}").unwrap();
        assert_eq!(expanded, "pass: 87654321");
        env::remove_var("KILOWATCH_TEST_PASS");
    }

    #[test]
    fn test_expand_env_vars_default() {
        env::remove_var("KILOWATCH_TEST_UNSET");
        let expanded = expand_env_vars("host: ${KILOWATCH_TEST_UNSET:-0.0.0.0}").unwrap();
        assert_eq!(expanded, "host: 0.0.0.0");
    }

    #[test]
    fn test_expand_env_vars_missing_is_error() {
        env::remove_var("KILOWATCH_TEST_MISSING");
        let err = expand_env_vars("pass: ${KILOWATCH_TEST_MISSING}").unwrap_err();
        assert!(err.to_string().contains("KILOWATCH_TEST_MISSING"));
    }

    #[test]
    fn test_expand_preserves_surrounding_text() {
        env::set_var("KILOWATCH_TEST_MID", "X");
        let expanded = expand_env_vars("a-${KILOWATCH_TEST_MID}-b-${KILOWATCH_TEST_MID}").unwrap();
        assert_eq!(expanded, "a-X-b-X");
        env::remove_var("KILOWATCH_TEST_MID");
    }

    #[test]
    fn test_load_yaml_string() {
        let config = load_from_str("poll_interval: 10s", ConfigFormat::Yaml).unwrap();
        assert_eq!(config.poll_interval, std::time::Duration::from_secs(10));
    }

    #[test]
    fn test_load_json_string() {
        let config =
            load_from_str(r#"{"max_in_flight": 16}"#, ConfigFormat::Json).unwrap();
        assert_eq!(config.max_in_flight, 16);
    }

    #[test]
    fn test_load_toml_string() {
        let config = load_from_str("tls_verify = true", ConfigFormat::Toml).unwrap();
        assert!(config.tls_verify);
    }

    #[test]
    fn test_load_config_from_file_with_env_password() {
        env::set_var("KILOWATCH_TEST_FILE_PASS", "s3cret");

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
poll_interval: 15s
auth:
  groups:
    lab:
      user: admin
      pass: ${{KILOWATCH_TEST_FILE_PASS}}
targets:
  - pdu: p1
    ip: 10.0.0.1
    auth_group: lab
    outlets: [1, 2]
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.auth.groups["lab"].password, "s3cret");
        assert_eq!(config.targets.len(), 1);

        env::remove_var("KILOWATCH_TEST_FILE_PASS");
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
targets:
  - pdu: p1
    ip: 10.0.0.1
    auth_group: nope
    outlets: [1]
"#
        )
        .unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("unknown auth_group"));
    }

    #[test]
    fn test_unreadable_file_is_config_error() {
        let err = load_from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
