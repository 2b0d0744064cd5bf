use actix_web::{web, HttpResponse, Responder};
use validator::Validate;
use crate::core::{MatchError, MatchingEngine};
use crate::models::{
    ErrorResponse, HealthResponse, MatchRequest, MatchResponse, SpeakersResponse, UserProfile,
};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    pub default_threshold: f64,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/speakers", web::get().to(list_speakers))
        .route("/match", web::post().to(match_speakers));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let speakers_loaded = state.engine.roster().map(|r| r.len()).unwrap_or(0);
    let status = if state.engine.roster().is_some() { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        speakers_loaded,
        timestamp: chrono::Utc::now(),
    })
}

/// List the loaded roster
///
/// GET /api/v1/speakers
async fn list_speakers(state: web::Data<AppState>) -> impl Responder {
    let speakers = state
        .engine
        .roster()
        .map(|r| r.speakers().to_vec())
        .unwrap_or_default();

    HttpResponse::Ok().json(SpeakersResponse {
        count: speakers.len(),
        speakers,
    })
}

/// Match speakers endpoint
///
/// POST /api/v1/match
///
/// Request body:
/// ```json
/// {
///   "user_bio": "string (>= 10 chars)",
///   "threshold": 6.0,
///   "include_all": false
/// }
/// ```
async fn match_speakers(
    state: web::Data<AppState>,
    req: web::Json<MatchRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for match request: {}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let req = req.into_inner();
    let threshold = req.threshold.unwrap_or(state.default_threshold);
    let profile = UserProfile::new(req.user_bio);

    tracing::info!("Matching profile ({} chars) at threshold {}", profile.text.len(), threshold);

    match state.engine.match_profile(&profile, threshold).await {
        Ok(batch) => HttpResponse::Ok().json(MatchResponse::from_batch(&batch, req.include_all)),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &MatchError) -> HttpResponse {
    tracing::error!("Match request failed: {}", err);
    match err {
        MatchError::Configuration(_) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: "Service not configured".to_string(),
            message: err.to_string(),
            status_code: 500,
        }),
        MatchError::Cancelled | MatchError::TimedOut(_) => {
            HttpResponse::GatewayTimeout().json(ErrorResponse {
                error: "Matching did not complete".to_string(),
                message: err.to_string(),
                status_code: 504,
            })
        }
    }
}
