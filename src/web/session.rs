use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use uuid::Uuid;

use crate::chat::ConversationState;
use crate::config::{clamp_max_tokens, CompletionConfig, SessionConfig};
use crate::prompt::GenerationParams;

/// Per-session overrides of the configured completion settings.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub api_key: Option<String>,
}

impl SessionSettings {
    pub fn generation_params(&self, defaults: &CompletionConfig) -> GenerationParams {
        GenerationParams {
            model: self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            max_output_tokens: clamp_max_tokens(self.max_tokens.unwrap_or(defaults.max_tokens)),
            temperature: self.temperature.unwrap_or(defaults.temperature),
        }
    }

    pub fn api_key<'a>(&'a self, defaults: &'a CompletionConfig) -> Option<&'a str> {
        self.api_key.as_deref().or(defaults.api_key.as_deref())
    }
}

#[derive(Debug)]
pub struct Session {
    pub username: String,
    pub conversation: ConversationState,
    pub settings: SessionSettings,
}

type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

struct Entry {
    session: SessionHandle,
    last_seen: Instant,
}

/// Live sessions keyed by id. Each session sits behind its own async mutex so
/// that turns of one conversation run one at a time.
///
/// Sessions idle for longer than the configured timeout are dropped whenever
/// the store is touched. At capacity, creating a session evicts the one that
/// has been idle longest.
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Entry>>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout: config.idle_timeout,
            max_sessions: config.max_sessions.max(1),
        }
    }

    pub fn create(&self, username: &str) -> Uuid {
        self.create_at(username, Instant::now())
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.get_at(id, Instant::now())
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.lock().remove(id).map(|entry| entry.session)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn create_at(&self, username: &str, now: Instant) -> Uuid {
        let id = Uuid::new_v4();
        let session = Session {
            username: username.to_string(),
            conversation: ConversationState::new(),
            settings: SessionSettings::default(),
        };

        let mut sessions = self.lock();
        self.prune_expired(&mut sessions, now);
        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                warn!("Session limit of {} reached; evicting {}", self.max_sessions, oldest);
                sessions.remove(&oldest);
            }
        }
        sessions.insert(
            id,
            Entry {
                session: Arc::new(tokio::sync::Mutex::new(session)),
                last_seen: now,
            },
        );
        info!("Created session {} for {}", id, username);
        id
    }

    fn get_at(&self, id: &Uuid, now: Instant) -> Option<SessionHandle> {
        let mut sessions = self.lock();
        self.prune_expired(&mut sessions, now);
        let entry = sessions.get_mut(id)?;
        entry.last_seen = now;
        Some(entry.session.clone())
    }

    fn prune_expired(&self, sessions: &mut HashMap<Uuid, Entry>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            info!("Expired {} idle sessions", expired);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.sessions.lock().unwrap_or_else(|poisoned| {
            error!("Session map mutex was poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> CompletionConfig {
        CompletionConfig {
            base_url: "http://localhost".to_string(),
            api_key: Some("env-key".to_string()),
            model: "gpt-4o".to_string(),
            max_tokens: 1500,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let settings = SessionSettings {
            model: Some("gpt-3.5-turbo".to_string()),
            temperature: None,
            max_tokens: Some(10_000),
            api_key: Some("user-key".to_string()),
        };
        let params = settings.generation_params(&defaults());
        assert_eq!(params.model, "gpt-3.5-turbo");
        assert_eq!(params.max_output_tokens, 4000);
        assert!((params.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.api_key(&defaults()), Some("user-key"));
    }

    #[test]
    fn empty_settings_fall_back_to_configuration() {
        let settings = SessionSettings::default();
        let defaults = defaults();
        assert_eq!(settings.generation_params(&defaults).model, "gpt-4o");
        assert_eq!(settings.api_key(&defaults), Some("env-key"));
    }

    fn store(idle_secs: u64, max_sessions: usize) -> SessionStore {
        SessionStore::new(&SessionConfig {
            idle_timeout: Duration::from_secs(idle_secs),
            max_sessions,
        })
    }

    #[test]
    fn store_creates_and_removes_sessions() {
        let store = store(3600, 10);
        let id = store.create("alice");
        assert_eq!(store.len(), 1);
        assert!(store.get(&id).is_some());
        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn idle_sessions_expire() {
        let store = store(60, 10);
        let start = Instant::now();
        let idle = store.create_at("alice", start);
        let active = store.create_at("bob", start);

        assert!(store.get_at(&active, start + Duration::from_secs(50)).is_some());
        assert!(store.get_at(&idle, start + Duration::from_secs(90)).is_none());
        assert!(store.get_at(&active, start + Duration::from_secs(90)).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_sessions_are_pruned_on_create() {
        let store = store(60, 10);
        let start = Instant::now();
        for name in ["a", "b", "c"] {
            store.create_at(name, start);
        }
        store.create_at("d", start + Duration::from_secs(120));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn capacity_evicts_least_recently_seen() {
        let store = store(3600, 2);
        let start = Instant::now();
        let first = store.create_at("first", start);
        let second = store.create_at("second", start + Duration::from_secs(1));
        assert!(store.get_at(&first, start + Duration::from_secs(2)).is_some());

        let third = store.create_at("third", start + Duration::from_secs(3));
        assert_eq!(store.len(), 2);
        let later = start + Duration::from_secs(4);
        assert!(store.get_at(&second, later).is_none());
        assert!(store.get_at(&first, later).is_some());
        assert!(store.get_at(&third, later).is_some());
    }
}
