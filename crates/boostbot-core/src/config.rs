use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::{errors::Error, messaging::throttled::ThrottleConfig, Result};

/// Typed runtime configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,

    // Storage
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub store_path: PathBuf,

    // Periodic sweep
    pub monitor_enabled: bool,
    pub monitor_interval: Duration,

    // Reactions
    pub reaction_max_attempts: u32,
    pub reaction_global_interval: Duration,
    pub reaction_chat_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let database_url = get("DATABASE_URL");
        let database_max_connections = parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5u32)?.max(1);
        let store_path = PathBuf::from(
            get("STORE_PATH").unwrap_or_else(|| "/tmp/boostbot-store.json".to_string()),
        );

        let monitor_enabled = match get("MONITOR_ENABLED") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                Error::Config(format!("MONITOR_ENABLED must be a boolean, got {v:?}"))
            })?,
            None => true,
        };
        let monitor_interval = Duration::from_secs(parse_or(&get, "MONITOR_INTERVAL_SECS", 300u64)?);
        if monitor_interval.is_zero() {
            return Err(Error::Config(
                "MONITOR_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let reaction_max_attempts = parse_or(&get, "REACTION_MAX_ATTEMPTS", 3u32)?.max(1);
        let reaction_global_interval =
            Duration::from_millis(parse_or(&get, "REACTION_GLOBAL_INTERVAL_MS", 40u64)?);
        let reaction_chat_interval =
            Duration::from_millis(parse_or(&get, "REACTION_CHAT_INTERVAL_MS", 1050u64)?);

        Ok(Self {
            telegram_bot_token,
            database_url,
            database_max_connections,
            store_path,
            monitor_enabled,
            monitor_interval,
            reaction_max_attempts,
            reaction_global_interval,
            reaction_chat_interval,
        })
    }

    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            global_min_interval: self.reaction_global_interval,
            per_chat_min_interval: self.reaction_chat_interval,
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}"))),
        None => Ok(default),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
