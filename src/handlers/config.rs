use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Read-only view of the active configuration. Model artifacts are loaded
/// once at startup, so there is no runtime update counterpart.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "model": {
                "model_path": config.model.model_path,
                "scaler_path": config.model.scaler_path,
                "feature_config_path": config.model.feature_config_path,
                "emotion_labels": config.model.emotion_labels
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "chunk_duration_secs": config.audio.chunk_duration_secs,
                "hop_length": config.audio.hop_length,
                "n_fft": config.audio.n_fft
            },
            "limits": {
                "max_file_size_bytes": config.limits.max_file_size_bytes,
                "allowed_extensions": config.limits.allowed_extensions,
                "max_streaming_connections": config.limits.max_streaming_connections,
                "streaming_idle_timeout_secs": config.limits.streaming_idle_timeout_secs
            }
        }
    })))
}
