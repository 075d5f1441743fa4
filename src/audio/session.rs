//! # Streaming Session Management
//!
//! Tracks active WebSocket streaming connections. Each connection is keyed by
//! the client-supplied client ID and registered for the lifetime of the
//! socket. The manager enforces the configured connection ceiling and feeds
//! the health endpoint a usage summary.
//!
//! The manager is created once at startup and injected wherever it is needed;
//! there is no ambient global registry.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-connection bookkeeping.
#[derive(Debug, Clone)]
pub struct StreamingSession {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    pub chunks_received: u64,
    pub last_chunk_at: Option<DateTime<Utc>>,
}

impl StreamingSession {
    fn new(client_id: String) -> Self {
        Self {
            client_id,
            connected_at: Utc::now(),
            chunks_received: 0,
            last_chunk_at: None,
        }
    }
}

/// Registry of active streaming connections.
///
/// ## Thread Safety:
/// Uses RwLock so many readers (health checks) or one writer
/// (connect/disconnect) can access the registry at a time.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, StreamingSession>>,
    max_connections: usize,
}

impl SessionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Register a new streaming connection.
    ///
    /// ## Returns:
    /// - **Ok(())**: Connection registered
    /// - **Err(message)**: Connection limit reached or client ID already in use
    pub fn register(&self, client_id: &str) -> Result<(), String> {
        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.max_connections {
            return Err(format!(
                "Maximum concurrent connections ({}) reached",
                self.max_connections
            ));
        }

        if sessions.contains_key(client_id) {
            return Err(format!("Client '{}' is already connected", client_id));
        }

        sessions.insert(
            client_id.to_string(),
            StreamingSession::new(client_id.to_string()),
        );
        Ok(())
    }

    /// Remove a connection (called on disconnect, clean or abrupt).
    pub fn remove(&self, client_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(client_id).is_some()
    }

    /// Record that a chunk arrived for the given client.
    pub fn record_chunk(&self, client_id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(session) = sessions.get_mut(client_id) {
            session.chunks_received += 1;
            session.last_chunk_at = Some(Utc::now());
        }
    }

    /// Get a snapshot of one session's bookkeeping.
    pub fn get(&self, client_id: &str) -> Option<StreamingSession> {
        let sessions = self.sessions.read().unwrap();
        sessions.get(client_id).cloned()
    }

    /// Number of currently registered connections.
    pub fn active_count(&self) -> usize {
        let sessions = self.sessions.read().unwrap();
        sessions.len()
    }

    /// Usage summary for the health endpoint.
    pub fn summary(&self) -> SessionSummary {
        let sessions = self.sessions.read().unwrap();
        SessionSummary {
            active_connections: sessions.len(),
            max_connections: self.max_connections,
            total_chunks_received: sessions.values().map(|s| s.chunks_received).sum(),
        }
    }
}

/// Snapshot of session manager state.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub active_connections: usize,
    pub max_connections: usize,
    pub total_chunks_received: u64,
}
