use std::sync::Arc;

use actix_files as fs;
use actix_web::{web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info, warn};
use tera::Tera;

use webmind::chat::TurnPipeline;
use webmind::config::Config;
use webmind::model::OpenAiClient;
use webmind::search::{KeywordTrigger, SerpApiClient};
use webmind::web::{routes, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting WebMind web application");

    let config = Config::from_env();
    if config.completion.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; users must supply a key in Settings");
    }
    if config.search.api_key.is_none() {
        warn!("SERPAPI_API_KEY is not set; answers will not be grounded in web search");
    }

    let completion = match OpenAiClient::new(&config.completion) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize completion client: {}", e);
            std::process::exit(1);
        }
    };
    let search = match SerpApiClient::new(&config.search) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize search client: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = TurnPipeline::new(
        Box::new(KeywordTrigger::new(config.search.triggers.iter().cloned())),
        Arc::new(search),
        Arc::new(completion),
        config.search.result_count,
    );

    // Initialize template engine
    let mut tera = match Tera::new("templates/**/*") {
        Ok(t) => t,
        Err(e) => {
            error!("Template parsing error: {}", e);
            std::process::exit(1);
        }
    };
    tera.autoescape_on(vec![".html"]);

    let bind = (config.bind_addr.clone(), config.port);
    let app_state = Data::new(AppState::new(
        tera,
        pipeline,
        config.completion,
        &config.session,
    ));

    info!("Listening on http://{}:{}", bind.0, bind.1);

    // Start web server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
            .service(fs::Files::new("/static", "./static"))
    })
    .bind(bind)?
    .run()
    .await
}
