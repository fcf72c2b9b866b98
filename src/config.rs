use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{AppError, AppResult, code::CodeFormat};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Base of the OAuth redirect urls.
    pub public_url: String,

    pub room_ttl: Duration,
    pub create_attempts: u32,
    pub code_format: CodeFormat,
    pub sweep_interval: Duration,

    /// Form and JSON field carrying the room code.
    pub code_field: String,
    /// Form field carrying the caller's peer address.
    pub peer_field: String,

    pub cookie_name: String,
    /// Session field holding the signed-in [`crate::session::SessionUser`].
    pub user_field: String,
    pub session_inactivity: Duration,
    pub client_secrets: PathBuf,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            public_url: "http://localhost:8080".to_owned(),
            room_ttl: Duration::from_secs(3600),
            create_attempts: 5,
            code_format: CodeFormat::Pattern,
            sweep_interval: Duration::from_secs(60),
            code_field: "code".to_owned(),
            peer_field: "peer".to_owned(),
            cookie_name: "roomlink.session".to_owned(),
            user_field: "user".to_owned(),
            session_inactivity: Duration::from_secs(60 * 60),
            client_secrets: PathBuf::from("client_secret.json"),
            cors_origins: Vec::new(),
        }
    }
}

fn parsed<T: FromStr>(key: &str, raw: Option<String>) -> AppResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    raw.map(|raw| {
        raw.trim()
            .parse()
            .map_err(|e| AppError::from(format!("{key}={raw:?} is invalid: {e}")))
    })
    .transpose()
}

impl Config {
    pub fn from_env() -> AppResult<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Config> {
        let mut config = Config::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(url) = lookup("PUBLIC_URL") {
            config.public_url = url.trim_end_matches('/').to_owned();
        }
        if let Some(secs) = parsed::<u64>("ROOM_TTL_IN_SEC", lookup("ROOM_TTL_IN_SEC"))? {
            config.room_ttl = Duration::from_secs(secs);
        }
        if let Some(attempts) = parsed::<u32>("ROOM_CREATE_ATTEMPTS", lookup("ROOM_CREATE_ATTEMPTS"))? {
            if attempts == 0 {
                return Err("ROOM_CREATE_ATTEMPTS must be at least 1".into());
            }
            config.create_attempts = attempts;
        }
        if let Some(format) = parsed::<CodeFormat>("ROOM_CODE_FORMAT", lookup("ROOM_CODE_FORMAT"))? {
            config.code_format = format;
        }
        if let Some(secs) = parsed::<u64>("ROOM_SWEEP_INTERVAL_SEC", lookup("ROOM_SWEEP_INTERVAL_SEC"))? {
            config.sweep_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(field) = lookup("ROOM_CODE_FIELD_NAME") {
            config.code_field = field;
        }
        if let Some(field) = lookup("ROOM_PEER_FIELD_NAME") {
            config.peer_field = field;
        }
        if let Some(name) = lookup("AUTH_COOKIE_NAME") {
            config.cookie_name = name;
        }
        if let Some(field) = lookup("AUTH_USER_FIELD_NAME") {
            config.user_field = field;
        }
        if let Some(minutes) = parsed::<u64>("AUTH_SESSION_MINUTES", lookup("AUTH_SESSION_MINUTES"))? {
            let seconds = minutes.checked_mul(60).ok_or("AUTH_SESSION_MINUTES is too large")?;
            config.session_inactivity = Duration::from_secs(seconds);
        }
        if let Some(path) = lookup("AUTH_CLIENT_SECRETS") {
            config.client_secrets = PathBuf::from(path);
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_owned)
                .collect();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.code_field, "code");
        assert_eq!(config.code_format, CodeFormat::Pattern);
        assert_eq!(config.create_attempts, 5);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("ROOM_TTL_IN_SEC", "90"),
            ("ROOM_CODE_FORMAT", "uuid"),
            ("ROOM_CODE_FIELD_NAME", "room"),
            ("PUBLIC_URL", "https://rooms.example/"),
            ("CORS_ORIGINS", "https://a.example, ,https://b.example"),
        ]))
        .unwrap();
        assert_eq!(config.room_ttl, Duration::from_secs(90));
        assert_eq!(config.code_format, CodeFormat::Uuid);
        assert_eq!(config.code_field, "room");
        assert_eq!(config.public_url, "https://rooms.example");
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[("ROOM_TTL_IN_SEC", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ROOM_CODE_FORMAT", "emoji")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ROOM_CREATE_ATTEMPTS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("AUTH_SESSION_MINUTES", "18446744073709551615")])).is_err());
    }
}
