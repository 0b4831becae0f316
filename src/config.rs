use std::path::PathBuf;

use crate::AppResult;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub public_url: String,
    pub client_secret_path: PathBuf,
    pub session_idle_minutes: i64,
    pub allowed_origin: Option<String>,
    pub log_json: bool,
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> AppResult<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Config> {
        let database_url = lookup("DATABASE_URL").ok_or("DATABASE_URL is not set")?;
        let session_idle_minutes = match lookup("SESSION_IDLE_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| format!("SESSION_IDLE_MINUTES should be a number, got {raw:?}"))?,
            None => 60,
        };
        let log_json = match lookup("LOG_JSON").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => return Err(format!("LOG_JSON should be true or false, got {other:?}").into()),
        };

        Ok(Config {
            database_url,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_owned()),
            public_url: lookup("PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_owned())
                .trim_end_matches('/')
                .to_owned(),
            client_secret_path: lookup("CLIENT_SECRET_PATH")
                .unwrap_or_else(|| "client_secret.json".to_owned())
                .into(),
            session_idle_minutes,
            allowed_origin: lookup("ALLOWED_ORIGIN").filter(|origin| !origin.is_empty()),
            log_json,
        })
    }
}
