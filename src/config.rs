use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::error::{AppErr, AppResult};

// ten years; tokio's interval panics once the deadline overflows `Instant`
const MAX_SWEEP_HOURS: u64 = 10 * 365 * 24;

#[derive(Debug, Clone)]
pub struct Config {
    pub port:           u16,
    pub keep_days:      i64,
    pub retention:      chrono::Duration,
    pub max_messages:   usize,
    pub data_dir:       PathBuf,
    pub static_dir:     PathBuf,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port:           3000,
            keep_days:      30,
            retention:      chrono::Duration::days(30),
            max_messages:   2000,
            data_dir:       "data".into(),
            static_dir:     "public".into(),
            sweep_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Absent or blank keys fall back to the default; anything else must parse.
    pub fn from_lookup<F>(get: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let keep_days: i64 = parse(&get, "KEEP_DAYS", d.keep_days)?;
        if keep_days < 0 {
            return Err(AppErr::Config("KEEP_DAYS must not be negative".into()));
        }
        let retention = chrono::Duration::try_days(keep_days)
            .ok_or_else(|| AppErr::Config(format!("KEEP_DAYS={keep_days} is too large")))?;
        let max_messages: usize = parse(&get, "MAX_MESSAGES", d.max_messages)?;
        if max_messages == 0 {
            return Err(AppErr::Config("MAX_MESSAGES must be at least 1".into()));
        }
        let hours: u64 = parse(&get, "SWEEP_INTERVAL_HOURS", 24)?;
        if !(1..=MAX_SWEEP_HOURS).contains(&hours) {
            return Err(AppErr::Config(format!(
                "SWEEP_INTERVAL_HOURS must be between 1 and {MAX_SWEEP_HOURS}"
            )));
        }
        let secs = hours * 60 * 60;

        Ok(Self {
            port: parse(&get, "PORT", d.port)?,
            keep_days,
            retention,
            max_messages,
            data_dir:   text(&get, "DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            static_dir: text(&get, "STATIC_DIR").map(PathBuf::from).unwrap_or(d.static_dir),
            sweep_interval: Duration::from_secs(secs),
        })
    }
}

fn text<F: Fn(&str) -> Option<String>>(get: &F, key: &str) -> Option<String> {
    get(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

fn parse<T, F>(get: &F, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match text(get, key) {
        None    => Ok(default),
        Some(v) => v.parse().map_err(|e| AppErr::Config(format!("{key}={v:?}: {e}"))),
    }
}
