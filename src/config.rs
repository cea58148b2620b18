use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};

use crate::search::DEFAULT_TRIGGER_PHRASES;

pub const MIN_MAX_TOKENS: u32 = 50;
pub const MAX_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Whether a sampling temperature is one the completion endpoint accepts.
pub fn is_valid_temperature(temperature: f32) -> bool {
    (0.0..=2.0).contains(&temperature)
}

/// Settings for the hosted completion service.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Settings for the web search provider.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub engine: String,
    pub result_count: usize,
    pub timeout: Duration,
    pub triggers: Vec<String>,
}

/// Limits on live browser sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub max_sessions: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub completion: CompletionConfig,
    pub search: SearchConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Reads configuration from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout = Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 60u64));

        let triggers = lookup("SEARCH_TRIGGERS")
            .map(|raw| {
                raw.split(',')
                    .map(|phrase| phrase.trim().to_lowercase())
                    .filter(|phrase| !phrase.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|phrases| !phrases.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_TRIGGER_PHRASES
                    .iter()
                    .map(|phrase| phrase.to_string())
                    .collect()
            });

        let completion = CompletionConfig {
            base_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key: non_empty(lookup("OPENAI_API_KEY")),
            model: non_empty(lookup("MODEL")).unwrap_or_else(|| "gpt-4o".to_string()),
            max_tokens: clamp_max_tokens(parse_or(&lookup, "MAX_TOKENS", 1500u32)),
            temperature: temperature_or_default(parse_or(
                &lookup,
                "TEMPERATURE",
                DEFAULT_TEMPERATURE,
            )),
            timeout,
        };

        let search = SearchConfig {
            base_url: lookup("SERPAPI_BASE_URL").unwrap_or_else(|| "https://serpapi.com".to_string()),
            api_key: non_empty(lookup("SERPAPI_API_KEY")),
            engine: non_empty(lookup("SEARCH_ENGINE")).unwrap_or_else(|| "google".to_string()),
            result_count: parse_or(&lookup, "SEARCH_RESULT_COUNT", 5usize),
            timeout,
            triggers,
        };

        let session = SessionConfig {
            idle_timeout: Duration::from_secs(parse_or(&lookup, "SESSION_IDLE_SECS", 3600u64)),
            max_sessions: parse_or(&lookup, "MAX_SESSIONS", 10_000usize).max(1),
        };

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "PORT", 8080u16),
            completion,
            search,
            session,
        }
    }
}

/// Keeps max output tokens within the range the completion endpoint accepts.
pub fn clamp_max_tokens(max_tokens: u32) -> u32 {
    if max_tokens < MIN_MAX_TOKENS {
        info!("Increasing max_tokens from {} to minimum of {}", max_tokens, MIN_MAX_TOKENS);
        MIN_MAX_TOKENS
    } else if max_tokens > MAX_MAX_TOKENS {
        info!("Capping max_tokens from {} to maximum of {}", max_tokens, MAX_MAX_TOKENS);
        MAX_MAX_TOKENS
    } else {
        max_tokens
    }
}

fn temperature_or_default(temperature: f32) -> f32 {
    if is_valid_temperature(temperature) {
        temperature
    } else {
        warn!(
            "TEMPERATURE {} is outside 0.0..=2.0; using {}",
            temperature, DEFAULT_TEMPERATURE
        );
        DEFAULT_TEMPERATURE
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable value for {}: {:?}", key, raw);
                default
            }
        },
        None => default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.completion.model, "gpt-4o");
        assert_eq!(config.completion.max_tokens, 1500);
        assert!((config.completion.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.completion.api_key.is_none());
        assert_eq!(config.search.engine, "google");
        assert_eq!(config.search.result_count, 5);
        assert_eq!(config.search.timeout, Duration::from_secs(60));
        assert_eq!(config.search.triggers.len(), DEFAULT_TRIGGER_PHRASES.len());
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let config = config_from(&[("PORT", "eighty"), ("TEMPERATURE", "warm")]);
        assert_eq!(config.port, 8080);
        assert!((config.completion.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn out_of_range_temperature_falls_back_to_default() {
        for raw in ["5", "-0.1", "NaN", "inf"] {
            let config = config_from(&[("TEMPERATURE", raw)]);
            assert_eq!(config.completion.temperature, DEFAULT_TEMPERATURE, "{}", raw);
        }
        let config = config_from(&[("TEMPERATURE", "2.0")]);
        assert_eq!(config.completion.temperature, 2.0);
    }

    #[test]
    fn session_limits_are_configurable() {
        let config = config_from(&[("SESSION_IDLE_SECS", "120"), ("MAX_SESSIONS", "0")]);
        assert_eq!(config.session.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.session.max_sessions, 1);

        let defaults = config_from(&[]);
        assert_eq!(defaults.session.idle_timeout, Duration::from_secs(3600));
        assert_eq!(defaults.session.max_sessions, 10_000);
    }

    #[test]
    fn blank_api_keys_count_as_absent() {
        let config = config_from(&[("OPENAI_API_KEY", "  "), ("SERPAPI_API_KEY", "serp")]);
        assert!(config.completion.api_key.is_none());
        assert_eq!(config.search.api_key.as_deref(), Some("serp"));
    }

    #[test]
    fn trigger_phrases_are_configurable() {
        let config = config_from(&[("SEARCH_TRIGGERS", " Weather , ,stock price")]);
        assert_eq!(config.search.triggers, vec!["weather", "stock price"]);
    }

    #[test]
    fn max_tokens_are_clamped() {
        assert_eq!(config_from(&[("MAX_TOKENS", "10")]).completion.max_tokens, 50);
        assert_eq!(config_from(&[("MAX_TOKENS", "9000")]).completion.max_tokens, 4000);
        assert_eq!(config_from(&[("MAX_TOKENS", "800")]).completion.max_tokens, 800);
    }
}
