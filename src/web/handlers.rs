use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use chrono::Local;
use log::{error, info};
use serde_json::json;
use tera::Context;
use uuid::Uuid;

use crate::chat::{TurnContext, UserErrorKind};
use crate::config::is_valid_temperature;
use crate::prompt::{GenerationParams, ASSISTANT_NAME};
use crate::web::models::{
    ChatRequest, ChatResponse, HistoryResponse, LoginRequest, LoginResponse, SessionRequest,
    SettingsResponse, SettingsUpdate,
};
use crate::web::AppState;

// Index page handler
pub async fn index(data: web::Data<AppState>) -> impl Responder {
    let mut context = Context::new();
    context.insert("app_name", ASSISTANT_NAME);
    context.insert("model", &data.completion.model);
    match data.tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => {
            error!("Template error: {}", e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn login(data: web::Data<AppState>, req: web::Json<LoginRequest>) -> impl Responder {
    let username = req.username.trim();
    if username.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "Username must not be empty" }));
    }

    let session_id = data.sessions.create(username);
    HttpResponse::Ok().json(LoginResponse {
        session_id,
        username: username.to_string(),
    })
}

pub async fn logout(data: web::Data<AppState>, req: web::Json<SessionRequest>) -> impl Responder {
    let Some(session) = data.sessions.remove(&req.session_id) else {
        return unknown_session(req.session_id);
    };

    // Waits for any in-flight turn before dropping the history.
    let mut session = session.lock().await;
    session.conversation.clear();
    info!("Session {} for {} logged out", req.session_id, session.username);
    HttpResponse::Ok().json(json!({ "status": "logged_out" }))
}

// Chat API endpoint
pub async fn chat(data: web::Data<AppState>, req: web::Json<ChatRequest>) -> impl Responder {
    let message = req.message.trim();
    if message.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "Message must not be empty" }));
    }

    let Some(session) = data.sessions.get(&req.session_id) else {
        return unknown_session(req.session_id);
    };

    // Held for the whole turn so one conversation never runs two turns at once.
    let mut session = session.lock().await;

    info!("Chat request from session {}: {}", req.session_id, message);

    let ctx = TurnContext {
        username: session.username.clone(),
        current_date: Local::now().date_naive(),
        params: session.settings.generation_params(&data.completion),
        api_key: session
            .settings
            .api_key(&data.completion)
            .map(str::to_string),
    };

    let outcome = data
        .pipeline
        .process_turn(session.conversation.clone(), message, &ctx)
        .await;
    session.conversation = outcome.state;

    let status = match outcome.error.as_ref().map(|e| e.kind) {
        None => StatusCode::OK,
        Some(UserErrorKind::Configuration) => StatusCode::SERVICE_UNAVAILABLE,
        Some(_) => StatusCode::BAD_GATEWAY,
    };

    HttpResponse::build(status).json(ChatResponse {
        session_id: req.session_id,
        reply: outcome.reply,
        searched: outcome.searched,
        warning: outcome.warning,
        error: outcome.error,
        turns: session.conversation.len(),
    })
}

pub async fn history(data: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let session_id = path.into_inner();
    let Some(session) = data.sessions.get(&session_id) else {
        return unknown_session(session_id);
    };

    let session = session.lock().await;
    HttpResponse::Ok().json(HistoryResponse {
        session_id,
        username: session.username.clone(),
        turns: session.conversation.turns().to_vec(),
    })
}

pub async fn get_settings(data: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let session_id = path.into_inner();
    let Some(session) = data.sessions.get(&session_id) else {
        return unknown_session(session_id);
    };

    let session = session.lock().await;
    let params = session.settings.generation_params(&data.completion);
    let api_key_configured = session.settings.api_key(&data.completion).is_some();
    HttpResponse::Ok().json(settings_response(session_id, params, api_key_configured))
}

pub async fn update_settings(
    data: web::Data<AppState>,
    req: web::Json<SettingsUpdate>,
) -> impl Responder {
    if let Some(temperature) = req.temperature {
        if !is_valid_temperature(temperature) {
            return HttpResponse::BadRequest()
                .json(json!({ "error": "Temperature must be between 0.0 and 2.0" }));
        }
    }

    let Some(session) = data.sessions.get(&req.session_id) else {
        return unknown_session(req.session_id);
    };

    let mut session = session.lock().await;
    let settings = &mut session.settings;
    if let Some(model) = &req.model {
        settings.model = Some(model.trim().to_string()).filter(|m| !m.is_empty());
    }
    if let Some(temperature) = req.temperature {
        settings.temperature = Some(temperature);
    }
    if let Some(max_tokens) = req.max_tokens {
        settings.max_tokens = Some(max_tokens);
    }
    if let Some(api_key) = &req.api_key {
        settings.api_key = Some(api_key.trim().to_string()).filter(|k| !k.is_empty());
    }

    info!("Updated settings for session {}", req.session_id);
    let params = settings.generation_params(&data.completion);
    let api_key_configured = settings.api_key(&data.completion).is_some();
    HttpResponse::Ok().json(settings_response(req.session_id, params, api_key_configured))
}

fn settings_response(
    session_id: Uuid,
    params: GenerationParams,
    api_key_configured: bool,
) -> SettingsResponse {
    SettingsResponse {
        session_id,
        model: params.model,
        temperature: params.temperature,
        max_tokens: params.max_output_tokens,
        api_key_configured,
    }
}

fn unknown_session(session_id: Uuid) -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "error": format!("Unknown session: {}", session_id)
    }))
}
