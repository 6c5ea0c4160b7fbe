//! Chat sessions: caller-owned transcript plus the deferred "typing" reply.
//!
//! A session appends the user message immediately, then schedules the responder
//! behind a fixed typing delay. Pending replies are tied to a cancellation token
//! that is cancelled on reset, close, or drop, so a torn-down session never
//! receives a late reply. Replies enter the transcript in submission order even
//! when the responder's latency varies. `SessionStore` keeps sessions by id for
//! the gateway and sweeps the idle ones.

use crate::responder::Responder;
use crate::transcript::{Message, Transcript};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Unique session identifier (opaque string).
pub type SessionId = String;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("session is closed")]
    Closed,
    #[error("session not found: {0}")]
    NotFound(String),
}

/// A message appended to some session's transcript; broadcast to observers (e.g. gateway clients).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub message: Message,
}

struct SessionState {
    transcript: Transcript,
    /// Child of the session lifetime token; replaced on reset.
    replies: CancellationToken,
    /// Resolves once the most recently submitted reply is appended or dropped.
    last_reply: Option<oneshot::Receiver<()>>,
}

/// One chat session. Create with [`ChatSession::new`]; reset or close explicitly.
pub struct ChatSession {
    id: SessionId,
    responder: Arc<dyn Responder>,
    typing_delay: Duration,
    lifetime: CancellationToken,
    state: Arc<RwLock<SessionState>>,
    pending: Arc<AtomicUsize>,
    last_active: Arc<Mutex<Instant>>,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl ChatSession {
    pub fn new(responder: Arc<dyn Responder>, typing_delay: Duration) -> Self {
        Self::with_id(
            format!("sess-{}", uuid::Uuid::new_v4()),
            responder,
            typing_delay,
        )
    }

    pub fn with_id(
        id: impl Into<SessionId>,
        responder: Arc<dyn Responder>,
        typing_delay: Duration,
    ) -> Self {
        let lifetime = CancellationToken::new();
        let state = SessionState {
            transcript: Transcript::new(),
            replies: lifetime.child_token(),
            last_reply: None,
        };
        Self {
            id: id.into(),
            responder,
            typing_delay,
            lifetime,
            state: Arc::new(RwLock::new(state)),
            pending: Arc::new(AtomicUsize::new(0)),
            last_active: Arc::new(Mutex::new(Instant::now())),
            events: None,
        }
    }

    /// Broadcast every appended message on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True while at least one reply is waiting out the typing delay.
    pub fn is_typing(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Time since the last submit, reply, or reset.
    pub fn idle_for(&self) -> Duration {
        last_active(&self.last_active).elapsed()
    }

    /// Snapshot of the transcript.
    pub async fn transcript(&self) -> Vec<Message> {
        self.state.read().await.transcript.messages().to_vec()
    }

    /// Append the user's text and schedule the assistant reply after the typing delay.
    pub async fn submit(&self, text: &str) -> Result<PendingReply, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.is_closed() {
            return Err(ChatError::Closed);
        }

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let (history, cancel, previous) = {
            let mut state = self.state.write().await;
            let history = state.transcript.messages().to_vec();
            let user = Message::user(text);
            state.transcript.push(user.clone());
            notify(self.events.as_ref(), &self.id, user);
            let previous = state.last_reply.replace(done_rx);
            (history, state.replies.clone(), previous)
        };
        touch(&self.last_active);

        self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(self.pending.clone());
        let responder = self.responder.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let last_active = self.last_active.clone();
        let session_id = self.id.clone();
        let delay = self.typing_delay;
        let text = text.to_string();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            // Dropped when this task ends, releasing the reply submitted after this one.
            let _done = done_tx;
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("session {}: reply cancelled while typing", session_id);
                    return None;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            let reply = tokio::select! {
                _ = cancel.cancelled() => return None,
                reply = responder.reply(&history, &text) => reply,
            };
            if let Some(previous) = previous {
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = previous => {}
                }
            }
            let mut state = state.write().await;
            if cancel.is_cancelled() {
                log::debug!("session {}: dropping reply for discarded transcript", session_id);
                return None;
            }
            state.transcript.push(reply.clone());
            notify(events.as_ref(), &session_id, reply.clone());
            touch(&last_active);
            Some(reply)
        });

        Ok(PendingReply { handle })
    }

    /// Cancel pending replies and start the transcript over from the greeting.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.replies.cancel();
        state.replies = self.lifetime.child_token();
        state.last_reply = None;
        state.transcript.reset();
        touch(&self.last_active);
        log::info!("session {}: reset", self.id);
    }

    /// Cancel pending replies; later submits fail with [`ChatError::Closed`].
    pub fn close(&self) {
        self.lifetime.cancel();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

fn notify(events: Option<&broadcast::Sender<SessionEvent>>, session_id: &str, message: Message) {
    if let Some(tx) = events {
        let _ = tx.send(SessionEvent {
            session_id: session_id.to_string(),
            message,
        });
    }
}

fn last_active(cell: &Mutex<Instant>) -> Instant {
    *cell.lock().unwrap_or_else(|e| e.into_inner())
}

fn touch(cell: &Mutex<Instant>) {
    *cell.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle to a scheduled reply. Dropping it does not cancel the reply.
pub struct PendingReply {
    handle: JoinHandle<Option<Message>>,
}

impl PendingReply {
    /// Wait for the reply. `None` if it was cancelled before reaching the transcript.
    pub async fn wait(self) -> Option<Message> {
        match self.handle.await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("session: reply task failed: {}", e);
                None
            }
        }
    }
}

/// In-memory store for sessions (create, get, remove). Shared by gateway handlers.
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, Arc<ChatSession>>>>,
    responder: Arc<dyn Responder>,
    typing_delay: Duration,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl SessionStore {
    pub fn new(responder: Arc<dyn Responder>, typing_delay: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            responder,
            typing_delay,
            events: None,
        }
    }

    /// Sessions created from now on broadcast their messages on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Create a new session with a generated id.
    pub async fn create(&self) -> Arc<ChatSession> {
        let mut session = ChatSession::new(self.responder.clone(), self.typing_delay);
        if let Some(tx) = &self.events {
            session = session.with_events(tx.clone());
        }
        let session = Arc::new(session);
        self.inner
            .write()
            .await
            .insert(session.id().to_string(), session.clone());
        log::debug!("created session {}", session.id());
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<ChatSession>> {
        self.inner.read().await.get(id).cloned()
    }

    /// Like [`SessionStore::get`], with a typed error for unknown ids.
    pub async fn require(&self, id: &str) -> Result<Arc<ChatSession>, ChatError> {
        self.get(id)
            .await
            .ok_or_else(|| ChatError::NotFound(id.to_string()))
    }

    /// Close and forget a session. Returns false if it did not exist.
    pub async fn remove(&self, id: &str) -> bool {
        match self.inner.write().await.remove(id) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Close and forget sessions idle for at least `ttl` with no reply pending.
    /// Returns the removed ids.
    pub async fn remove_idle(&self, ttl: Duration) -> Vec<SessionId> {
        let mut g = self.inner.write().await;
        let expired: Vec<SessionId> = g
            .iter()
            .filter(|(_, s)| !s.is_typing() && s.idle_for() >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(session) = g.remove(id) {
                session.close();
            }
        }
        if !expired.is_empty() {
            log::debug!("removed {} idle sessions", expired.len());
        }
        expired
    }

    /// Close every session (shutdown).
    pub async fn close_all(&self) {
        let mut g = self.inner.write().await;
        for (_, session) in g.drain() {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::{replies, ScriptedResponder};
    use crate::transcript::Speaker;

    fn session(delay_ms: u64) -> ChatSession {
        ChatSession::new(Arc::new(ScriptedResponder), Duration::from_millis(delay_ms))
    }

    #[tokio::test]
    async fn new_session_has_greeting_only() {
        let s = session(0);
        let t = s.transcript().await;
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].text(), replies::GREETING);
        assert!(s.id().starts_with("sess-"));
    }

    #[tokio::test]
    async fn submit_appends_user_then_reply() {
        let s = session(10);
        let pending = s.submit("qual o preço?").await.unwrap();

        let t = s.transcript().await;
        assert_eq!(t.len(), 2);
        assert_eq!(t[1].speaker(), Speaker::User);
        assert!(s.is_typing());

        let reply = pending.wait().await.expect("reply delivered");
        assert_eq!(reply.text(), replies::PRICING);
        assert!(!s.is_typing());

        let t = s.transcript().await;
        assert_eq!(t.len(), 3);
        assert_eq!(t[2], reply);
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let s = session(0);
        assert_eq!(s.submit("   ").await.err(), Some(ChatError::EmptyMessage));
        assert_eq!(s.submit("").await.err(), Some(ChatError::EmptyMessage));
        assert_eq!(s.transcript().await.len(), 1);
    }

    #[tokio::test]
    async fn reset_cancels_pending_reply() {
        let s = session(5_000);
        let pending = s.submit("blablabla").await.unwrap();
        s.reset().await;
        assert_eq!(pending.wait().await, None);
        assert_eq!(s.transcript().await.len(), 1);

        // session stays usable after reset
        let s2 = session(0);
        s2.reset().await;
        let reply = s2.submit("valeu").await.unwrap().wait().await;
        assert_eq!(reply.map(|m| m.text().to_string()), Some(replies::GRATITUDE.to_string()));
    }

    #[tokio::test]
    async fn close_cancels_and_rejects_new_input() {
        let s = session(5_000);
        let pending = s.submit("blablabla").await.unwrap();
        s.close();
        assert_eq!(pending.wait().await, None);
        assert_eq!(s.submit("oi").await.err(), Some(ChatError::Closed));
        assert_eq!(s.transcript().await.len(), 2);
    }

    #[tokio::test]
    async fn dropping_session_cancels_reply() {
        let s = session(5_000);
        let pending = s.submit("blablabla").await.unwrap();
        drop(s);
        assert_eq!(pending.wait().await, None);
    }

    #[tokio::test]
    async fn events_are_broadcast_for_each_append() {
        let (tx, mut rx) = broadcast::channel(8);
        let s = session(0).with_events(tx);
        s.submit("obrigado").await.unwrap().wait().await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.session_id, s.id());
        assert_eq!(first.message.speaker(), Speaker::User);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.message.text(), replies::GRATITUDE);
    }

    /// Answers "lento" slower than anything else.
    struct UnevenResponder;

    #[async_trait::async_trait]
    impl Responder for UnevenResponder {
        async fn reply(&self, _history: &[Message], text: &str) -> Message {
            if text == "lento" {
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            Message::assistant(format!("re: {}", text))
        }
    }

    #[tokio::test]
    async fn replies_keep_submission_order_with_uneven_latency() {
        let s = ChatSession::new(Arc::new(UnevenResponder), Duration::ZERO);
        let slow = s.submit("lento").await.unwrap();
        let fast = s.submit("rapido").await.unwrap();

        let fast = fast.wait().await.expect("fast reply");
        let slow = slow.wait().await.expect("slow reply");
        assert_eq!(fast.text(), "re: rapido");
        assert_eq!(slow.text(), "re: lento");

        let texts: Vec<String> = s
            .transcript()
            .await
            .iter()
            .map(|m| m.text().to_string())
            .collect();
        assert_eq!(texts[1..], ["lento", "rapido", "re: lento", "re: rapido"]);
    }

    #[tokio::test]
    async fn reset_releases_replies_waiting_on_a_cancelled_one() {
        let s = ChatSession::new(Arc::new(UnevenResponder), Duration::ZERO);
        let slow = s.submit("lento").await.unwrap();
        s.reset().await;
        let next = s.submit("oi").await.unwrap();
        assert_eq!(slow.wait().await, None);
        assert_eq!(next.wait().await.map(|m| m.text().to_string()), Some("re: oi".to_string()));
        assert_eq!(s.transcript().await.len(), 3);
    }

    #[tokio::test]
    async fn store_sweeps_idle_sessions() {
        let store = SessionStore::new(Arc::new(ScriptedResponder), Duration::ZERO);
        let idle = store.create().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let fresh = store.create().await;

        let removed = store.remove_idle(Duration::from_millis(40)).await;
        assert_eq!(removed, vec![idle.id().to_string()]);
        assert!(idle.is_closed());
        assert!(!fresh.is_closed());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn store_keeps_sessions_with_a_pending_reply() {
        let store = SessionStore::new(Arc::new(ScriptedResponder), Duration::from_millis(5_000));
        let s = store.create().await;
        let _pending = s.submit("oi").await.unwrap();
        assert!(store.remove_idle(Duration::ZERO).await.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn store_create_get_remove() {
        let store = SessionStore::new(Arc::new(ScriptedResponder), Duration::ZERO);
        let s = store.create().await;
        assert_eq!(store.len().await, 1);
        assert!(store.get(s.id()).await.is_some());

        assert!(store.remove(s.id()).await);
        assert!(s.is_closed());
        assert!(!store.remove(s.id()).await);
        assert_eq!(
            store.require(s.id()).await.err(),
            Some(ChatError::NotFound(s.id().to_string()))
        );
    }
}
