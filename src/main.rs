use actix_cors::Cors;
use actix_web::{web, App, HttpServer, HttpResponse, middleware, error, http::StatusCode};
use speaker_match::config::Settings;
use speaker_match::core::{MatchingEngine, ScoringClient};
use speaker_match::routes::{self, matches::AppState};
use speaker_match::services::{build_backend, Roster};
use std::sync::Arc;
use tracing::{info, warn, error};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_logging(&settings.logging.level, &settings.logging.format);

    info!("Starting speaker match service...");

    // The service stays up without a roster and reports it on each match request
    let roster = match Roster::load(&settings.roster.path) {
        Ok(roster) => {
            info!("Loaded {} speakers from {}", roster.len(), settings.roster.path);
            Some(Arc::new(roster))
        }
        Err(e) => {
            error!("Failed to load speakers from {}: {}", settings.roster.path, e);
            None
        }
    };

    let provider = settings.llm.provider;
    let backend_config = settings.llm.backend_config();
    let model = backend_config.model.clone();

    let backend = build_backend(provider, backend_config).map_err(|e| {
        error!("Failed to create language-model client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    if !backend.is_configured() {
        warn!(
            "No API key configured for {:?} (set {}); match requests will fail",
            provider,
            provider.env_vars().0
        );
    }

    info!("Language-model client initialized ({:?}, model: {})", provider, model);

    let client = ScoringClient::new(backend, settings.matching.retry_policy());

    let engine = MatchingEngine::new(client, roster, settings.matching.engine_config())
        .map_err(|e| {
            error!("Invalid matching configuration: {}", e);
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
        })?;

    info!("Matching engine initialized with {:?}", engine.config());

    let app_state = AppState {
        engine: Arc::new(engine),
        default_threshold: settings.matching.default_threshold,
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
