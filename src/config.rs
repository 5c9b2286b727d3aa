use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetsBackend {
    Google,
    Memory,
}

#[derive(Debug, Clone)]
pub enum SheetsCredential {
    /// Path to a Google service-account JSON key.
    ServiceAccountFile(String),
    /// Pre-issued OAuth bearer token.
    AccessToken(String),
}

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub backend: SheetsBackend,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub credential: Option<SheetsCredential>,
    pub api_base: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub app_name: String,
    pub app_version: String,
    pub environment: String,
    pub sheets: SheetsSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port = parse_var("PORT", &get("PORT", "8000"), "port number")?;
        let timeout_secs: u64 = parse_var(
            "SHEETS_TIMEOUT_SECS",
            &get("SHEETS_TIMEOUT_SECS", "15"),
            "number of seconds",
        )?;
        let max_retries =
            parse_var("SHEETS_MAX_RETRIES", &get("SHEETS_MAX_RETRIES", "2"), "retry count")?;

        let backend = match get("SHEETS_BACKEND", "google").to_lowercase().as_str() {
            "google" => SheetsBackend::Google,
            "memory" => SheetsBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "SHEETS_BACKEND",
                    expected: "backend ('google' or 'memory')",
                    value: other.to_string(),
                })
            }
        };

        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let credential = non_empty("GOOGLE_SERVICE_ACCOUNT_FILE")
            .map(SheetsCredential::ServiceAccountFile)
            .or_else(|| non_empty("GOOGLE_SHEETS_ACCESS_TOKEN").map(SheetsCredential::AccessToken));

        Ok(Settings {
            host: get("HOST", "127.0.0.1"),
            port,
            database_url: get("DATABASE_URL", "sqlite://./health_risk.db"),
            app_name: get("APP_NAME", "Health Risk API"),
            app_version: get("APP_VERSION", env!("CARGO_PKG_VERSION")),
            environment: get("ENVIRONMENT", "development"),
            sheets: SheetsSettings {
                backend,
                spreadsheet_id: non_empty("GOOGLE_SHEET_ID"),
                sheet_name: get("USER_DATA_SHEET_NAME", "user_data"),
                credential,
                api_base: get("SHEETS_API_BASE", "https://sheets.googleapis.com"),
                timeout: Duration::from_secs(timeout_secs),
                max_retries,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    name: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        expected,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.database_url, "sqlite://./health_risk.db");
        assert_eq!(settings.app_name, "Health Risk API");
        assert_eq!(settings.environment, "development");
        assert_eq!(settings.sheets.backend, SheetsBackend::Google);
        assert_eq!(settings.sheets.sheet_name, "user_data");
        assert_eq!(settings.sheets.max_retries, 2);
        assert_eq!(settings.sheets.timeout, Duration::from_secs(15));
        assert!(settings.sheets.spreadsheet_id.is_none());
        assert!(settings.sheets.credential.is_none());
    }

    #[test]
    fn service_account_file_wins_over_access_token() {
        let settings = settings_from(&[
            ("GOOGLE_SERVICE_ACCOUNT_FILE", "/etc/sa.json"),
            ("GOOGLE_SHEETS_ACCESS_TOKEN", "ya29.token"),
        ])
        .unwrap();
        assert!(matches!(
            settings.sheets.credential,
            Some(SheetsCredential::ServiceAccountFile(ref p)) if p == "/etc/sa.json"
        ));
    }

    #[test]
    fn rejects_invalid_port() {
        let err = settings_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(settings_from(&[("SHEETS_BACKEND", "excel")]).is_err());
        let settings = settings_from(&[("SHEETS_BACKEND", "Memory")]).unwrap();
        assert_eq!(settings.sheets.backend, SheetsBackend::Memory);
    }
}
