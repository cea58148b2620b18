use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;

use super::{ConversationState, Role};
use crate::model::{CompletionProvider, DispatchError, DispatchErrorKind};
use crate::prompt::{self, GenerationParams};
use crate::search::{SearchProvider, SearchTrigger};

/// Progress of a single user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Enriching,
    Composing,
    Dispatching,
    Completed,
    Failed,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("{0}")]
    Configuration(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserErrorKind {
    Configuration,
    RateLimit,
    Authentication,
    Connectivity,
    Unknown,
}

/// A failed turn as shown to the user. `details` holds the technical text and
/// belongs in a secondary, collapsed element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserVisibleError {
    pub kind: UserErrorKind,
    pub message: String,
    pub solution: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl From<&TurnError> for UserVisibleError {
    fn from(err: &TurnError) -> Self {
        match err {
            TurnError::Configuration(message) => Self {
                kind: UserErrorKind::Configuration,
                message: message.clone(),
                solution: "Create a secret key at https://platform.openai.com/api-keys and save it in Settings, or set OPENAI_API_KEY before starting the server.".to_string(),
                details: None,
                retryable: false,
            },
            TurnError::Dispatch(dispatch) => {
                let (kind, message, solution) = match dispatch.kind() {
                    DispatchErrorKind::RateLimit => (
                        UserErrorKind::RateLimit,
                        "Rate limit exceeded. Your OpenAI account has reached its usage limit or quota.",
                        "Check your OpenAI usage limits at https://platform.openai.com/account/limits or consider upgrading your plan.",
                    ),
                    DispatchErrorKind::Authentication => (
                        UserErrorKind::Authentication,
                        "Authentication error. Your API key may be invalid or expired.",
                        "Please update your API key in Settings.",
                    ),
                    DispatchErrorKind::Connectivity => (
                        UserErrorKind::Connectivity,
                        "Connection timeout. Unable to reach the completion service.",
                        "Please check your internet connection and try again later.",
                    ),
                    DispatchErrorKind::Unknown => (
                        UserErrorKind::Unknown,
                        "An error occurred while generating a response.",
                        "Please try again or check Settings to verify your configuration.",
                    ),
                };
                Self {
                    kind,
                    message: message.to_string(),
                    solution: solution.to_string(),
                    details: Some(dispatch.to_string()),
                    retryable: dispatch.is_retryable(),
                }
            }
        }
    }
}

/// Per-turn inputs owned by the host: who is talking, today's date, and the
/// generation settings in effect for the session.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub username: String,
    pub current_date: NaiveDate,
    pub params: GenerationParams,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: ConversationState,
    pub phase: TurnPhase,
    pub reply: Option<String>,
    pub searched: bool,
    pub warning: Option<String>,
    pub error: Option<UserVisibleError>,
}

/// Runs a user turn through search enrichment, prompt composition and dispatch.
pub struct TurnPipeline {
    trigger: Box<dyn SearchTrigger>,
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    result_count: usize,
}

impl TurnPipeline {
    pub fn new(
        trigger: Box<dyn SearchTrigger>,
        search: Arc<dyn SearchProvider>,
        completion: Arc<dyn CompletionProvider>,
        result_count: usize,
    ) -> Self {
        Self {
            trigger,
            search,
            completion,
            result_count,
        }
    }

    /// Processes one turn. Never fails: every error is folded into the outcome.
    ///
    /// A configuration error leaves `state` untouched. A dispatch error keeps
    /// the user's message but records no assistant turn.
    pub async fn process_turn(
        &self,
        state: ConversationState,
        user_text: &str,
        ctx: &TurnContext,
    ) -> TurnOutcome {
        let mut phase = TurnPhase::Idle;
        debug!("Turn for {} starting in phase {:?}", ctx.username, phase);

        let api_key = match ctx.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => key,
            None => {
                let err = TurnError::Configuration(
                    "OpenAI API key is not configured. Please add your API key in Settings."
                        .to_string(),
                );
                warn!("Rejecting turn for {}: {}", ctx.username, err);
                return failed(state, false, None, &err);
            }
        };

        let state = state.append_turn(Role::User, user_text);

        let searched = self.trigger.needs_search(user_text);
        let mut warning = None;
        let mut summary = None;
        if searched {
            phase = TurnPhase::Enriching;
            debug!("Turn phase {:?}", phase);
            match self.search.search(user_text, self.result_count).await {
                Ok(bundle) if bundle.is_empty() => {
                    info!("Search returned nothing usable; answering without grounding");
                }
                Ok(bundle) => summary = Some(prompt::format_search_summary(&bundle)),
                Err(e) => {
                    warn!("Web search failed: {}", e);
                    warning = Some(format!("Web search error: {}. Using AI knowledge only.", e));
                }
            }
        }

        phase = TurnPhase::Composing;
        debug!("Turn phase {:?}", phase);
        let system_instruction = prompt::build_system_instruction(&ctx.username, ctx.current_date);
        let request = prompt::compose(
            &system_instruction,
            summary.as_deref(),
            state.turns(),
            ctx.params.clone(),
        );

        phase = TurnPhase::Dispatching;
        debug!("Turn phase {:?}", phase);
        match self.completion.dispatch(&request, api_key).await {
            Ok(reply) => {
                let state = state.append_turn(Role::Assistant, reply.content.clone());
                info!("Turn completed; conversation has {} turns", state.len());
                TurnOutcome {
                    state,
                    phase: TurnPhase::Completed,
                    reply: Some(reply.content),
                    searched,
                    warning,
                    error: None,
                }
            }
            Err(e) => {
                error!("Completion failed ({:?}): {}", e.kind(), e);
                failed(state, searched, warning, &TurnError::Dispatch(e))
            }
        }
    }
}

fn failed(
    state: ConversationState,
    searched: bool,
    warning: Option<String>,
    err: &TurnError,
) -> TurnOutcome {
    TurnOutcome {
        state,
        phase: TurnPhase::Failed,
        reply: None,
        searched,
        warning,
        error: Some(UserVisibleError::from(err)),
    }
}
