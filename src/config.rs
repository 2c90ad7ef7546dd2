//!
//! commentboard server configuration
//! ---------------------------------
//! Every setting resolves in the same order: command-line flag, then environment
//! variable, then built-in default. Values that are present but unparsable are
//! errors rather than silently falling back.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};

use crate::storage::{RestTableConfig, StoreConfig};

pub const DEFAULT_HTTP_PORT: u16 = 7979;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_TABLE: &str = "comments";

/// How the create endpoint treats the `author` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Require a signed session whose email equals `author`.
    VerifySession,
    /// Accept any `author` string.
    TrustClient,
}

impl AuthMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verify-session" | "verify" | "session" => Some(AuthMode::VerifySession),
            "trust-client" | "trust" | "none" => Some(AuthMode::TrustClient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::VerifySession => "verify-session",
            AuthMode::TrustClient => "trust-client",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_port: u16,
    pub store: StoreConfig,
    pub auth: AuthMode,
    /// Shared HMAC secret for session tokens. Without one a random secret is used,
    /// which only verifies tokens minted by this process.
    pub session_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { http_port: DEFAULT_HTTP_PORT, store: StoreConfig::Memory, auth: AuthMode::VerifySession, session_secret: None }
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).cloned();
        }
        if let Some(v) = args[i].strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            return Some(v.to_string());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl ServerConfig {
    /// Resolve from the process arguments and environment.
    pub fn load(args: &[String]) -> Result<Self> {
        Self::resolve(args, |k| std::env::var(k).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve<F>(args: &[String], env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |flag: &str, var: &str| arg_value(args, flag).or_else(|| env(var)).filter(|v| !v.trim().is_empty());

        let http_port = match pick("--http-port", "BOARD_HTTP_PORT") {
            Some(v) => v.trim().parse::<u16>().map_err(|e| anyhow!("invalid http port '{}': {}", v, e))?,
            None => DEFAULT_HTTP_PORT,
        };

        let auth = match pick("--auth", "BOARD_AUTH") {
            Some(v) => AuthMode::parse(&v).ok_or_else(|| anyhow!("invalid auth mode '{}' (expected verify-session or trust-client)", v))?,
            None => AuthMode::VerifySession,
        };

        let data_dir = PathBuf::from(pick("--data-dir", "BOARD_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));
        let store_kind = pick("--store", "BOARD_STORE").unwrap_or_else(|| "memory".to_string());
        let store = match store_kind.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => StoreConfig::Memory,
            "parquet" | "file" => StoreConfig::Parquet { data_dir },
            "rest" | "hosted" => {
                let url = pick("--rest-url", "BOARD_REST_URL").ok_or_else(|| anyhow!("BOARD_REST_URL is required for the rest store"))?;
                let api_key = pick("--rest-key", "BOARD_REST_KEY").ok_or_else(|| anyhow!("BOARD_REST_KEY is required for the rest store"))?;
                let table = pick("--rest-table", "BOARD_REST_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
                StoreConfig::Rest(RestTableConfig { url, api_key, table })
            }
            other => bail!("unknown store '{}' (expected memory, parquet or rest)", other),
        };

        let session_secret = env("BOARD_SESSION_SECRET").filter(|s| !s.is_empty());

        Ok(Self { http_port, store, auth, session_secret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = ServerConfig::resolve(&[], env_of(&[])).unwrap();
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn flags_override_env() {
        let cfg = ServerConfig::resolve(
            &args(&["board_server", "--http-port", "9000", "--store=parquet", "--data-dir", "/tmp/board"]),
            env_of(&[("BOARD_HTTP_PORT", "8000"), ("BOARD_STORE", "memory"), ("BOARD_AUTH", "trust-client")]),
        )
        .unwrap();
        assert_eq!(cfg.http_port, 9000);
        assert_eq!(cfg.store, StoreConfig::Parquet { data_dir: PathBuf::from("/tmp/board") });
        assert_eq!(cfg.auth, AuthMode::TrustClient);
    }

    #[test]
    fn rest_store_needs_url_and_key() {
        let err = ServerConfig::resolve(&args(&["--store", "rest"]), env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("BOARD_REST_URL"));
        let cfg = ServerConfig::resolve(
            &args(&["--store", "rest"]),
            env_of(&[("BOARD_REST_URL", "https://abc.example.co"), ("BOARD_REST_KEY", "k"), ("BOARD_SESSION_SECRET", "s")]),
        )
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreConfig::Rest(RestTableConfig { url: "https://abc.example.co".into(), api_key: "k".into(), table: "comments".into() })
        );
        assert_eq!(cfg.session_secret.as_deref(), Some("s"));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(ServerConfig::resolve(&args(&["--http-port", "http"]), env_of(&[])).is_err());
        assert!(ServerConfig::resolve(&[], env_of(&[("BOARD_AUTH", "maybe")])).is_err());
        assert!(ServerConfig::resolve(&args(&["--store", "sqlite"]), env_of(&[])).is_err());
    }

    #[test]
    fn auth_mode_names() {
        assert_eq!(AuthMode::parse("Verify-Session"), Some(AuthMode::VerifySession));
        assert_eq!(AuthMode::parse("trust"), Some(AuthMode::TrustClient));
        assert_eq!(AuthMode::VerifySession.as_str(), "verify-session");
        assert!(has_flag(&args(&["-h"]), "-h"));
    }
}
