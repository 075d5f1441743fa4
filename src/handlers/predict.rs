//! # File Prediction Handler
//!
//! `POST /predict/file`: multipart upload of one audio file, answered with a
//! `PredictionResult`. Validation order matters for the error messages:
//! extension allow-list first, then the streamed size ceiling, then decode.
//! Decode and inference run on a blocking worker thread so the async
//! executor is never stalled by a large file.

use crate::audio::decoder::{decode_file, DecodeError};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt as _;
use tracing::{debug, info};

/// Uploaded file: raw bytes plus the lowercased extension.
struct UploadedFile {
    data: Vec<u8>,
    extension: String,
}

pub async fn predict_file(
    payload: Multipart,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let config = state.get_config();

    let upload = read_upload(
        payload,
        &config.limits.allowed_extensions,
        config.limits.max_file_size_bytes,
        config.max_file_size_mb(),
    )
    .await?;

    info!(
        extension = %upload.extension,
        bytes = upload.data.len(),
        "Received file for prediction"
    );

    let predictor = state.predictor.clone();
    let result = web::block(move || {
        let waveform = decode_file(&upload.data, Some(&upload.extension)).map_err(|e| match e {
            DecodeError::EmptyInput => AppError::BadRequest("Empty audio file".to_string()),
            DecodeError::UnsupportedFormat(msg) | DecodeError::DecodeFailed(msg) => {
                AppError::BadRequest(format!("Could not decode audio file: {}", msg))
            }
        })?;
        Ok::<_, AppError>(predictor.predict_waveform(waveform))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Worker pool error: {}", e)))??;

    Ok(HttpResponse::Ok().json(result))
}

/// Pull the `file` field out of the multipart stream, enforcing the
/// extension allow-list and size ceiling while the body streams in.
async fn read_upload(
    mut payload: Multipart,
    allowed_extensions: &[String],
    max_size_bytes: usize,
    max_size_mb: usize,
) -> AppResult<UploadedFile> {
    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("Invalid multipart payload: {}", e)))?;

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(|name| name.to_string());

        let Some(filename) = filename else {
            // Not a file field; skip it
            continue;
        };

        let extension = filename
            .rsplit('.')
            .next()
            .filter(|ext| *ext != filename)
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        if !allowed_extensions.iter().any(|a| *a == extension) {
            return Err(AppError::BadRequest(format!(
                "File type not allowed. Allowed types: {}",
                allowed_extensions.join(", ")
            )));
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
            if data.len() + chunk.len() > max_size_bytes {
                return Err(AppError::BadRequest(format!(
                    "File too large. Maximum size is {} MB",
                    max_size_mb
                )));
            }
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            return Err(AppError::BadRequest("Empty audio file".to_string()));
        }

        debug!(filename = %filename, bytes = data.len(), "Upload read");
        return Ok(UploadedFile { data, extension });
    }

    Err(AppError::BadRequest(
        "No file field in multipart payload".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::SessionManager;
    use crate::config::AppConfig;
    use crate::inference::PredictionService;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn test_state(max_file_size_bytes: usize) -> AppState {
        let mut config = AppConfig::default();
        config.model.model_path = "/nonexistent/model.safetensors".to_string();
        config.model.scaler_path = "/nonexistent/scaler.json".to_string();
        config.model.feature_config_path = "/nonexistent/feature_config.json".to_string();
        config.limits.max_file_size_bytes = max_file_size_bytes;

        let predictor = Arc::new(PredictionService::initialize(&config));
        let sessions = Arc::new(SessionManager::new(
            config.limits.max_streaming_connections,
        ));
        AppState::new(config, predictor, sessions)
    }

    /// Single-field multipart body with the given filename and content.
    fn multipart_body(filename: &str, content: &[u8]) -> (String, Vec<u8>) {
        let boundary = "----emotion-backend-test";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", boundary),
            body,
        )
    }

    async fn post_file(
        state: AppState,
        filename: &str,
        content: &[u8],
    ) -> (u16, serde_json::Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/predict/file", web::post().to(predict_file)),
        )
        .await;

        let (content_type, body) = multipart_body(filename, content);
        let req = test::TestRequest::post()
            .uri("/predict/file")
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request();

        let resp = test::call_service(&app, req).await;
        let status = resp.status().as_u16();
        let json: serde_json::Value = test::read_body_json(resp).await;
        (status, json)
    }

    #[actix_web::test]
    async fn test_disallowed_extension_is_400_naming_allowed_types() {
        let (status, body) = post_file(test_state(10 * 1024 * 1024), "notes.txt", b"hello").await;
        assert_eq!(status, 400);

        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("File type not allowed"), "{}", message);
        assert!(message.contains("wav, mp3, m4a, flac"), "{}", message);
    }

    #[actix_web::test]
    async fn test_oversize_upload_is_400_naming_limit_in_mb() {
        // 1 MB ceiling, 1 MB + 1 byte payload
        let content = vec![0u8; 1024 * 1024 + 1];
        let (status, body) = post_file(test_state(1024 * 1024), "big.wav", &content).await;
        assert_eq!(status, 400);

        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("File too large"), "{}", message);
        assert!(message.contains("1 MB"), "{}", message);
    }

    #[actix_web::test]
    async fn test_undecodable_upload_is_400() {
        let (status, body) =
            post_file(test_state(10 * 1024 * 1024), "noise.wav", &[0xAB; 256]).await;
        assert_eq!(status, 400);

        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("Could not decode audio file"), "{}", message);
    }
}
