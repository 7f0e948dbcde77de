use std::env;

use log::LevelFilter;

/// Value of `DATABASE_URL` that selects the in-process store.
pub const MEMORY_STORE: &str = "memory";

pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub client_id: String,
    pub client_secret: String,
    pub spotify_token_url: String,
    pub spotify_api_url: String,
    pub log_level: LevelFilter,
    pub body_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .unwrap_or(4000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://hightracks.db?mode=rwc".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "password".to_string()),
            client_id: env::var("CLIENT_ID").unwrap_or_else(|_| "none".to_string()),
            client_secret: env::var("CLIENT_SECRET").unwrap_or_else(|_| "none".to_string()),
            spotify_token_url: env::var("SPOTIFY_TOKEN_URL")
                .unwrap_or_else(|_| "https://accounts.spotify.com/api/token".to_string()),
            spotify_api_url: env::var("SPOTIFY_API_URL").unwrap_or_else(|_| "https://api.spotify.com/v1".to_string()),
            log_level: env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(LevelFilter::Info),
            body_limit: env::var("BODY_LIMIT_BYTES")
                .ok()
                .and_then(|limit| limit.parse().ok())
                .unwrap_or(50 * 1024 * 1024),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_STORE
    }
}
