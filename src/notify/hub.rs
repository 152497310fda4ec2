use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Server-sent frame shapes. Client frames (`ping`/`echo`) are
/// parsed ad hoc in the reader loop -- unknown types are silently dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    #[serde(rename = "auth_success")]
    AuthSuccess { user_id: Uuid, session_id: Uuid },
    #[serde(rename = "auth_failure")]
    AuthFailure { message: String },
    #[serde(rename = "labReportCreated")]
    LabReportCreated { lab_report_id: Uuid, ocr_data_id: Uuid, timestamp: DateTime<Utc> },
    #[serde(rename = "pong")]
    Pong { timestamp: DateTime<Utc> },
    #[serde(rename = "echo_response")]
    EchoResponse { data: serde_json::Value, timestamp: DateTime<Utc> },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerFrame {
    fn into_message(self) -> Message {
        // Serialization of our own enum can't fail.
        Message::Text(serde_json::to_string(&self).unwrap().into())
    }
}

pub struct SessionInfo {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub struct HubStatus {
    pub total_connections: usize,
    pub total_users: usize,
    pub active_sessions: usize,
    pub user_sessions: HashMap<Uuid, usize>,
}

struct SessionHandle {
    created_at: DateTime<Utc>,
    sender: mpsc::UnboundedSender<Message>,
    missed_heartbeats: AtomicU32,
}

/// Per-user multi-map of live sessions over a duplex transport.
/// The map's lock is held only for the brief span of a mutation or lookup;
/// it never guards the actual socket I/O, so one user's slow peer cannot
/// stall another's send.
pub struct Hub {
    sessions: Mutex<HashMap<Uuid, HashMap<Uuid, SessionHandle>>>,
    heartbeat_interval: Duration,
}

impl Hub {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), heartbeat_interval }
    }

    /// Spawns the background probe loop. Call once per process.
    pub fn spawn_heartbeat(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.heartbeat_interval);
            loop {
                ticker.tick().await;
                self.probe_all().await;
            }
        });
    }

    async fn probe_all(&self) {
        let mut to_evict = Vec::new();
        {
            let sessions = self.sessions.lock().await;
            for (user_id, user_sessions) in sessions.iter() {
                for (session_id, handle) in user_sessions.iter() {
                    if handle.missed_heartbeats.load(Ordering::SeqCst) >= 2 {
                        to_evict.push((*user_id, *session_id));
                        continue;
                    }
                    handle.missed_heartbeats.fetch_add(1, Ordering::SeqCst);
                    let _ = handle.sender.send(Message::Ping(Vec::new().into()));
                }
            }
        }
        for (user_id, session_id) in to_evict {
            tracing::info!(%user_id, %session_id, "session missed two heartbeats, evicting");
            self.evict(user_id, session_id).await;
        }
    }

    async fn evict(&self, user_id: Uuid, session_id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        if let Some(user_sessions) = sessions.get_mut(&user_id) {
            user_sessions.remove(&session_id);
            if user_sessions.is_empty() {
                sessions.remove(&user_id);
            }
        }
    }

    /// Authenticates the connection, then owns it until close. On auth
    /// failure, sends a single `auth_failure` frame and returns.
    pub async fn accept(self: Arc<Self>, socket: WebSocket, auth: Result<(Uuid, String), String>) {
        let (mut sink, mut stream) = socket.split();

        let user_id = match auth {
            Ok((user_id, _username)) => user_id,
            Err(message) => {
                let _ = sink.send(ServerFrame::AuthFailure { message }.into_message()).await;
                let _ = sink.close().await;
                return;
            }
        };

        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        {
            let mut sessions = self.sessions.lock().await;
            sessions.entry(user_id).or_default().insert(
                session_id,
                SessionHandle { created_at: Utc::now(), sender: tx.clone(), missed_heartbeats: AtomicU32::new(0) },
            );
        }

        let _ = tx.send(ServerFrame::AuthSuccess { user_id, session_id }.into_message());

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = Self::handle_client_frame(&text) {
                        let _ = tx.send(reply.into_message());
                    }
                }
                Message::Pong(_) => {
                    let sessions = self.sessions.lock().await;
                    if let Some(handle) = sessions.get(&user_id).and_then(|s| s.get(&session_id)) {
                        handle.missed_heartbeats.store(0, Ordering::SeqCst);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        writer.abort();
        self.evict(user_id, session_id).await;
    }

    fn handle_client_frame(text: &str) -> Option<ServerFrame> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        match value.get("type").and_then(|t| t.as_str())? {
            "ping" => Some(ServerFrame::Pong { timestamp: Utc::now() }),
            "echo" => Some(ServerFrame::EchoResponse {
                data: value.get("data").cloned().unwrap_or(serde_json::Value::Null),
                timestamp: Utc::now(),
            }),
            _ => None,
        }
    }

    /// Writes to every live session for `userId`. Returns true iff at least
    /// one write succeeded; a per-session send failure evicts that session
    /// only.
    pub async fn send(&self, user_id: Uuid, lab_report_id: Uuid, ocr_data_id: Uuid) -> bool {
        let frame = ServerFrame::LabReportCreated { lab_report_id, ocr_data_id, timestamp: Utc::now() }.into_message();

        let targets: Vec<Uuid> = {
            let sessions = self.sessions.lock().await;
            sessions.get(&user_id).map(|s| s.keys().copied().collect()).unwrap_or_default()
        };

        let mut delivered = false;
        let mut dead = Vec::new();
        {
            let sessions = self.sessions.lock().await;
            if let Some(user_sessions) = sessions.get(&user_id) {
                for session_id in &targets {
                    if let Some(handle) = user_sessions.get(session_id) {
                        if handle.sender.send(frame.clone()).is_ok() {
                            delivered = true;
                        } else {
                            dead.push(*session_id);
                        }
                    }
                }
            }
        }
        for session_id in dead {
            self.evict(user_id, session_id).await;
        }
        delivered
    }

    pub async fn close_user(&self, user_id: Uuid, code: u16, reason: &str) -> usize {
        let removed = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&user_id)
        };
        let Some(removed) = removed else {
            return 0;
        };
        let count = removed.len();
        for handle in removed.into_values() {
            let _ = handle.sender.send(Message::Close(Some(axum::extract::ws::CloseFrame {
                code,
                reason: reason.to_string().into(),
            })));
        }
        count
    }

    pub async fn sessions(&self, user_id: Uuid) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&user_id)
            .map(|s| s.iter().map(|(id, h)| SessionInfo { session_id: *id, created_at: h.created_at }).collect())
            .unwrap_or_default()
    }

    pub async fn status(&self) -> HubStatus {
        let sessions = self.sessions.lock().await;
        let user_sessions: HashMap<Uuid, usize> = sessions.iter().map(|(user_id, s)| (*user_id, s.len())).collect();
        let total_connections: usize = user_sessions.values().sum();
        HubStatus {
            total_connections,
            total_users: sessions.len(),
            active_sessions: total_connections,
            user_sessions,
        }
    }

    /// Closes every session and clears the map (process shutdown).
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        for user_sessions in sessions.values() {
            for handle in user_sessions.values() {
                let _ = handle.sender.send(Message::Close(None));
            }
        }
        sessions.clear();
    }
}
