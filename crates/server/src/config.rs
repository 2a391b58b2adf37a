use config::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub security: SecuritySettings,
    pub realtime: RealtimeSettings,
    pub query: QuerySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Deserialize, Clone)]
pub struct SecuritySettings {
    pub admin_token: String,
}

#[derive(Deserialize, Clone)]
pub struct RealtimeSettings {
    /// Events buffered per room before slow subscribers start lagging.
    pub room_capacity: usize,
}

#[derive(Deserialize, Clone)]
pub struct QuerySettings {
    pub count_timeout_ms: u64,
}

impl QuerySettings {
    pub fn count_timeout(&self) -> Duration {
        Duration::from_millis(self.count_timeout_ms)
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        let env_map = collect_env_vars();
        let env_json = serde_json::to_string(&env_map)
            .map_err(|e| ConfigError::Message(format!("environment not serializable: {}", e)))?;

        let s = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origins", "*")?
            .set_default("database.url", "sqlite://data/quill.db")?
            .set_default("database.max_connections", 8)?
            .set_default("security.admin_token", "admin_secret_123")?
            .set_default("realtime.room_capacity", 64)?
            .set_default("query.count_timeout_ms", 3000)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(config::File::from_str(&env_json, config::FileFormat::Json))
            .build()?;

        s.try_deserialize()
    }
}

fn collect_env_vars() -> HashMap<String, String> {
    env_overrides(std::env::vars())
}

/// `QUILL_QUERY__COUNT_TIMEOUT_MS=500` becomes `query.count_timeout_ms`.
fn env_overrides(vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
    vars.filter(|(k, _)| k.starts_with("QUILL_"))
        .map(|(k, v)| {
            let new_key = k
                .trim_start_matches("QUILL_")
                .replace("__", ".")
                .to_lowercase();
            (new_key, v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_map_to_nested_keys() {
        let vars = vec![
            ("QUILL_QUERY__COUNT_TIMEOUT_MS".to_string(), "500".to_string()),
            ("QUILL_SECURITY__ADMIN_TOKEN".to_string(), "s3cret".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        let map = env_overrides(vars.into_iter());
        assert_eq!(map.len(), 2);
        assert_eq!(map["query.count_timeout_ms"], "500");
        assert_eq!(map["security.admin_token"], "s3cret");
    }

    #[test]
    fn test_count_timeout_is_in_millis() {
        let q = QuerySettings {
            count_timeout_ms: 250,
        };
        assert_eq!(q.count_timeout(), Duration::from_millis(250));
    }
}
