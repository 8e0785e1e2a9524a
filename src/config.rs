use std::net::SocketAddr;

use crate::ledger::DEFAULT_DIFFICULTY;

/// Highest accepted proof-of-work difficulty. Sealing cost grows 16x per step.
pub const MAX_DIFFICULTY: u32 = 8;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Ledger-wide difficulty, fixed for the process lifetime.
    pub difficulty: u32,
    /// Object storage bucket holding certificate documents.
    pub document_bucket: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address: {0}")]
    InvalidAddr(#[from] std::net::AddrParseError),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("LEDGER_DIFFICULTY must be at most {}, got {}", MAX_DIFFICULTY, .0)]
    DifficultyTooHigh(u32),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            difficulty: DEFAULT_DIFFICULTY,
            document_bucket: "certificate-documents".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(addr) => addr.parse::<SocketAddr>()?,
            None => defaults.listen_addr,
        };

        let difficulty = match lookup("LEDGER_DIFFICULTY") {
            Some(value) => parse_number("LEDGER_DIFFICULTY", value)?,
            None => defaults.difficulty,
        };
        if difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::DifficultyTooHigh(difficulty));
        }

        let document_bucket = lookup("DOCUMENT_BUCKET")
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(defaults.document_bucket);

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(value) => parse_number("MAX_UPLOAD_BYTES", value)?,
            None => defaults.max_upload_bytes,
        };

        Ok(Self {
            listen_addr,
            difficulty,
            document_bucket,
            max_upload_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(cfg.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(cfg.document_bucket, "certificate-documents");
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("LISTEN_ADDR", "0.0.0.0:8080"),
            ("LEDGER_DIFFICULTY", "2"),
            ("DOCUMENT_BUCKET", "prod-docs"),
            ("MAX_UPLOAD_BYTES", "1024"),
        ])
        .unwrap();
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert_eq!(cfg.difficulty, 2);
        assert_eq!(cfg.document_bucket, "prod-docs");
        assert_eq!(cfg.max_upload_bytes, 1024);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(matches!(
            load(&[("LISTEN_ADDR", "nowhere")]),
            Err(ConfigError::InvalidAddr(_))
        ));
        assert!(matches!(
            load(&[("LEDGER_DIFFICULTY", "four")]),
            Err(ConfigError::InvalidValue { name: "LEDGER_DIFFICULTY", .. })
        ));
        assert!(matches!(
            load(&[("LEDGER_DIFFICULTY", "9")]),
            Err(ConfigError::DifficultyTooHigh(9))
        ));
    }
}
