pub mod config;
pub mod predict;

pub use config::*;
pub use predict::*;

use actix_web::HttpResponse;
use serde_json::json;

/// Root banner so a browser hit shows the service is alive.
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "service": "emotion-backend",
        "message": "Voice Emotion Detection API",
        "status": "running"
    }))
}
