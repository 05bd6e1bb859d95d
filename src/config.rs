//! Environment selection and credentials.
//! Production is the default; staging and development hosts are for NIBE partners.

use std::fmt;
use std::str::FromStr;
use std::{fs, path::Path};

use crate::auth::Token;
use crate::error::ApiError;

pub const PROD_BASE_URL: &str = "https://api.myuplink.com";
pub const STAGE_BASE_URL: &str = "https://stagepublicapi.nibejpi.com";
pub const DEV_BASE_URL: &str = "https://publicapi.nibejpi.com";

pub const OAUTH_AUTHORIZE: &str = "/oauth/authorize";
pub const OAUTH_TOKEN: &str = "/oauth/token";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Production => PROD_BASE_URL,
            Environment::Staging => STAGE_BASE_URL,
            Environment::Development => DEV_BASE_URL,
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Production),
            "stage" | "staging" => Ok(Environment::Staging),
            "dev" | "development" => Ok(Environment::Development),
            other => Err(format!("unknown myUplink environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        };
        f.write_str(name)
    }
}

/// API host plus the OAuth application credentials registered for it.
///
/// No validation happens here; a bad URL or secret only shows up on the first request.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl EnvironmentConfig {
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        EnvironmentConfig {
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn for_environment(env: Environment, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::new(env.base_url(), client_id, client_secret)
    }

    pub fn production(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::for_environment(Environment::Production, client_id, client_secret)
    }

    pub fn staging(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::for_environment(Environment::Staging, client_id, client_secret)
    }

    pub fn development(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::for_environment(Environment::Development, client_id, client_secret)
    }

    /// `base_url` joined with `path`, tolerating a trailing slash on the base.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

// Keep the secret out of logs.
impl fmt::Debug for EnvironmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Read a token previously written by [`save_token_file`] (or any tool using the same JSON layout).
pub fn load_token_file(path: &Path) -> Result<Option<Token>, ApiError> {
    match fs::read_to_string(path) {
        Ok(s) if !s.trim().is_empty() => Ok(Some(serde_json::from_str(&s)?)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ApiError::Io(format!("reading {}: {}", path.display(), e))),
    }
}

pub fn save_token_file(path: &Path, token: &Token) -> Result<(), ApiError> {
    let json = serde_json::to_string_pretty(token)?;
    fs::write(path, json).map_err(|e| ApiError::Io(format!("writing {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_names_parse() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!(" Staging ".parse::<Environment>(), Ok(Environment::Staging));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn url_join_handles_slashes() {
        let cfg = EnvironmentConfig::new("https://api.myuplink.com/", "id", "secret");
        assert_eq!(cfg.url("/v2/systems/me"), "https://api.myuplink.com/v2/systems/me");
        assert_eq!(cfg.url("oauth/token"), "https://api.myuplink.com/oauth/token");
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = EnvironmentConfig::staging("id", "hunter2");
        let printed = format!("{:?}", cfg);
        assert!(printed.contains(STAGE_BASE_URL));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn token_file_round_trip() {
        let path = std::env::temp_dir().join(format!("myuplink-token-{}.json", std::process::id()));
        assert!(load_token_file(&path).unwrap().is_none());

        let token = Token {
            access_token: "abc".into(),
            refresh_token: Some("def".into()),
            token_type: Some("Bearer".into()),
            expires_in: Some(3600),
            expires_at: Some(1_700_000_000.0),
            scope: vec!["READSYSTEM".into(), "offline_access".into()],
        };
        save_token_file(&path, &token).unwrap();
        let loaded = load_token_file(&path).unwrap().expect("token written");
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, token);
    }
}
