use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};

use crate::{
    Error, Result, COMMENT_CHUNK_SIZE, DEFAULT_DELAY_SECS, ENDPOINT, FILE_PREFIX,
    MAX_CONCURRENT_REQUESTS, USER_AGENT_STRING, USER_CHUNK_SIZE,
};

const ENV_ENDPOINT: &str = "FORUMDUMP_ENDPOINT";
const ENV_PREFIX: &str = "FORUMDUMP_PREFIX";
const ENV_MAX_CONCURRENT: &str = "FORUMDUMP_MAX_CONCURRENT";
const ENV_DELAY_SECS: &str = "FORUMDUMP_DELAY_SECS";
const ENV_COMMENT_CHUNK: &str = "FORUMDUMP_COMMENT_CHUNK";
const ENV_USER_CHUNK: &str = "FORUMDUMP_USER_CHUNK";

/// Settings for one dump run.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub endpoint: String,
    pub file_prefix: String,
    pub max_concurrent: usize,
    pub delay: Duration,
    pub comment_chunk_size: usize,
    pub user_chunk_size: usize,
    pub headers: HeaderMap,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            endpoint: ENDPOINT.into(),
            file_prefix: FILE_PREFIX.into(),
            max_concurrent: MAX_CONCURRENT_REQUESTS,
            delay: Duration::from_secs_f64(DEFAULT_DELAY_SECS),
            comment_chunk_size: COMMENT_CHUNK_SIZE,
            user_chunk_size: USER_CHUNK_SIZE,
            headers: default_headers(),
        }
    }
}

impl DumpConfig {
    /// Defaults overridden by any `FORUMDUMP_*` variables present in the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            cfg.endpoint = endpoint;
        }
        if let Some(prefix) = lookup(ENV_PREFIX) {
            cfg.file_prefix = prefix;
        }
        if let Some(raw) = lookup(ENV_MAX_CONCURRENT) {
            cfg.max_concurrent = parse_positive(ENV_MAX_CONCURRENT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DELAY_SECS) {
            let secs: f64 = parse_value(ENV_DELAY_SECS, &raw)?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(Error::InvalidDelay(secs));
            }
            cfg.delay =
                Duration::try_from_secs_f64(secs).map_err(|_| Error::InvalidDelay(secs))?;
        }
        if let Some(raw) = lookup(ENV_COMMENT_CHUNK) {
            cfg.comment_chunk_size = parse_positive(ENV_COMMENT_CHUNK, &raw)?;
        }
        if let Some(raw) = lookup(ENV_USER_CHUNK) {
            cfg.user_chunk_size = parse_positive(ENV_USER_CHUNK, &raw)?;
        }

        Ok(cfg)
    }
}

/// JSON content type plus a desktop browser user agent.
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers
}

/// Builds a `HeaderMap` from plain name/value pairs.
pub fn header_map<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name =
            HeaderName::from_str(name).map_err(|_| Error::InvalidHeader(name.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(value.to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| Error::InvalidConfig {
        key,
        value: raw.to_string(),
    })
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize> {
    match parse_value(key, raw)? {
        0 => Err(Error::InvalidConfig {
            key,
            value: raw.to_string(),
        }),
        n => Ok(n),
    }
}
