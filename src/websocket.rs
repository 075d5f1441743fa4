//! # WebSocket Streaming Handler
//!
//! Real-time emotion prediction over WebSocket. Clients connect to
//! `/ws/realtime/{client_id}` and send binary PCM chunks; every chunk is
//! answered with a JSON text frame.
//!
//! ## Protocol:
//! - **Client → Server**: binary frames of headerless little-endian PCM
//!   (i16, i32, or f32; mono; at the configured sample rate)
//! - **Server → Client**: either a serialized `PredictionResult` or an
//!   `{"error": ..., "message": ...}` payload for that chunk
//!
//! A failed chunk never ends the session; the loop simply continues with the
//! next one. Each connection is an independent actor, so one client's errors
//! or slow inference cannot affect another client's session.

use crate::audio::decoder::{decode_raw_chunk, DecodeError};
use crate::audio::session::SessionManager;
use crate::inference::PredictionService;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the idle check runs.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Per-chunk error payload sent as a text frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamError {
    pub error: String,
    pub message: String,
}

impl StreamError {
    fn unsupported_format(message: impl Into<String>) -> Self {
        Self {
            error: "Unsupported audio format".to_string(),
            message: message.into(),
        }
    }

    fn connection_rejected(message: impl Into<String>) -> Self {
        Self {
            error: "Connection rejected".to_string(),
            message: message.into(),
        }
    }
}

/// WebSocket actor for one streaming client.
pub struct EmotionStreamSocket {
    /// Client identifier from the URL path
    client_id: String,

    /// Shared prediction pipeline
    predictor: Arc<PredictionService>,

    /// Registry this connection is tracked in
    sessions: Arc<SessionManager>,

    /// Sample rate raw chunks are assumed to arrive at
    sample_rate: u32,

    /// Samples in one nominal chunk; much larger chunks are logged
    nominal_chunk_samples: usize,

    /// Connections idle longer than this are closed
    idle_timeout: Duration,

    /// Last time we heard anything from the client
    last_activity: Instant,

    /// Whether this connection made it into the session registry
    registered: bool,
}

impl EmotionStreamSocket {
    pub fn new(client_id: String, app_state: &AppState) -> Self {
        let config = app_state.get_config();
        Self {
            client_id,
            predictor: app_state.predictor.clone(),
            sessions: app_state.sessions.clone(),
            sample_rate: config.audio.sample_rate,
            nominal_chunk_samples: config.audio.nominal_chunk_samples(),
            idle_timeout: Duration::from_secs(config.limits.streaming_idle_timeout_secs),
            last_activity: Instant::now(),
            registered: false,
        }
    }

    /// Decode one binary chunk and hand it to the blocking pool. The reply
    /// is delivered back to the actor as a `SendText` message.
    fn handle_chunk(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        self.last_activity = Instant::now();
        self.sessions.record_chunk(&self.client_id);

        let samples = match decode_raw_chunk(data) {
            Ok(samples) => samples,
            Err(e) => {
                let message = match &e {
                    DecodeError::EmptyInput => "Empty audio chunk".to_string(),
                    _ => e.to_string(),
                };
                self.send_stream_error(ctx, StreamError::unsupported_format(message));
                return;
            }
        };

        debug!(
            client_id = %self.client_id,
            bytes = data.len(),
            samples = samples.len(),
            nominal = self.nominal_chunk_samples,
            "Received audio chunk"
        );

        if samples.len() > self.nominal_chunk_samples * 2 {
            warn!(
                client_id = %self.client_id,
                samples = samples.len(),
                nominal = self.nominal_chunk_samples,
                "Chunk is much larger than the nominal chunk duration"
            );
        }

        let predictor = self.predictor.clone();
        let sample_rate = self.sample_rate;
        let addr = ctx.address();

        // Inference is CPU-bound; keep it off the actor's event loop
        tokio::task::spawn_blocking(move || {
            let result = predictor.predict_samples(samples, sample_rate);
            if let Ok(json) = serde_json::to_string(&result) {
                addr.do_send(SendText(json));
            }
        });
    }

    fn send_stream_error(&self, ctx: &mut ws::WebsocketContext<Self>, error: StreamError) {
        warn!(
            client_id = %self.client_id,
            error = %error.error,
            message = %error.message,
            "Streaming error"
        );
        if let Ok(json) = serde_json::to_string(&error) {
            ctx.text(json);
        }
    }
}

/// Message for sending text to the WebSocket client.
#[derive(Message)]
#[rtype(result = "()")]
struct SendText(String);

impl Actor for EmotionStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        match self.sessions.register(&self.client_id) {
            Ok(()) => {
                self.registered = true;
                info!(
                    client_id = %self.client_id,
                    active = self.sessions.active_count(),
                    "Streaming connection started"
                );
            }
            Err(message) => {
                self.send_stream_error(ctx, StreamError::connection_rejected(message));
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Again,
                    description: None,
                }));
                ctx.stop();
                return;
            }
        }

        // Idle timeout enforcement plus keepalive pings
        ctx.run_interval(IDLE_CHECK_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_activity) > act.idle_timeout {
                warn!(client_id = %act.client_id, "Streaming connection idle timeout, closing");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if self.registered {
            self.sessions.remove(&self.client_id);
        }
        info!(
            client_id = %self.client_id,
            active = self.sessions.active_count(),
            "Streaming connection stopped"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for EmotionStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.handle_chunk(&data, ctx);
            }
            Ok(ws::Message::Text(_)) => {
                // The streaming protocol is binary-only
                self.last_activity = Instant::now();
                self.send_stream_error(
                    ctx,
                    StreamError::unsupported_format("Expected binary audio chunks"),
                );
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_activity = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_activity = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(client_id = %self.client_id, ?reason, "Client closed connection");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(client_id = %self.client_id, "Unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<SendText> for EmotionStreamSocket {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// HTTP-to-WebSocket upgrade for `/ws/realtime/{client_id}`.
pub async fn emotion_stream(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let client_id = path.into_inner();
    info!(
        client_id = %client_id,
        peer = ?req.connection_info().peer_addr(),
        "New streaming connection request"
    );

    let socket = EmotionStreamSocket::new(client_id, &app_state);
    ws::start(socket, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_payload_shape() {
        let error = StreamError::unsupported_format("chunk length 7 does not match");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"error\":\"Unsupported audio format\""));
        assert!(json.contains("chunk length 7"));
    }

    #[test]
    fn test_bad_chunk_does_not_block_the_next_chunk() {
        use crate::config::AppConfig;

        let mut config = AppConfig::default();
        config.model.model_path = "/nonexistent/model.safetensors".to_string();
        config.model.scaler_path = "/nonexistent/scaler.json".to_string();
        config.model.feature_config_path = "/nonexistent/feature_config.json".to_string();
        let predictor = PredictionService::initialize(&config);
        let sessions = SessionManager::new(4);
        sessions.register("a").unwrap();
        sessions.register("b").unwrap();

        // Client a sends an undecodable chunk: the reply is an error payload,
        // not a dropped connection
        sessions.record_chunk("a");
        let err = decode_raw_chunk(&[0u8; 7]).unwrap_err();
        let reply = StreamError::unsupported_format(err.to_string());
        assert_eq!(reply.error, "Unsupported audio format");

        // Client b's next chunk decodes and predicts normally
        sessions.record_chunk("b");
        let good: Vec<u8> = (0..640i16).flat_map(|v| v.to_le_bytes()).collect();
        let samples = decode_raw_chunk(&good).unwrap();
        let result = predictor.predict_samples(samples, config.audio.sample_rate);
        assert_eq!(result.class_probs.len(), 6);

        // And so does client a's own follow-up chunk
        sessions.record_chunk("a");
        let samples = decode_raw_chunk(&good).unwrap();
        let result = predictor.predict_samples(samples, config.audio.sample_rate);
        assert!(result.class_probs.contains_key(&result.label));

        assert_eq!(sessions.active_count(), 2);
    }

    #[test]
    fn test_stream_error_round_trip() {
        let error = StreamError::connection_rejected("Maximum concurrent connections (100) reached");
        let json = serde_json::to_string(&error).unwrap();
        let back: StreamError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.error, "Connection rejected");
        assert!(back.message.contains("100"));
    }
}
