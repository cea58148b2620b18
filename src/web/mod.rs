pub mod handlers;
pub mod models;
pub mod routes;
pub mod session;

use tera::Tera;

use crate::chat::TurnPipeline;
use crate::config::{CompletionConfig, SessionConfig};
use session::SessionStore;

// App state structure
pub struct AppState {
    pub tera: Tera,
    pub pipeline: TurnPipeline,
    pub completion: CompletionConfig,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        tera: Tera,
        pipeline: TurnPipeline,
        completion: CompletionConfig,
        sessions: &SessionConfig,
    ) -> Self {
        Self {
            tera,
            pipeline,
            completion,
            sessions: SessionStore::new(sessions),
        }
    }
}
