use actix_web::web;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/login", web::post().to(handlers::login))
            .route("/logout", web::post().to(handlers::logout))
            .route("/chat", web::post().to(handlers::chat))
            .route("/history/{session_id}", web::get().to(handlers::history))
            .route("/settings", web::post().to(handlers::update_settings))
            .route("/settings/{session_id}", web::get().to(handlers::get_settings))
    )
    .route("/", web::get().to(handlers::index))
    .route("/health", web::get().to(handlers::health_check));
}
