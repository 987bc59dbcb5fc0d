//! Session registry: lifecycle, TTL, and per-session outbound queues.
//!
//! Sessions live in a concurrent map; per-session mutable state sits
//! behind its own lock so unrelated sessions never serialise behind the
//! world lock. The outbound queue is bounded: under backpressure the
//! enqueuer sheds the oldest droppable frame and never sheds
//! session-lifecycle or combat-transition frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Notify;

use grimbox_domain::{EntityId, SessionId};
use grimbox_protocol::WsFrame;

/// Default bound of the per-session outbound queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown session")]
    NotFound,
    #[error("session has expired")]
    Expired,
}

/// TTL bookkeeping, guarded by the per-session lock.
#[derive(Debug, Clone, Copy)]
struct Liveness {
    expires_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

/// Bounded outbound frame queue with drop-oldest-droppable shedding.
pub struct Outbound {
    queue: Mutex<VecDeque<WsFrame>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Outbound {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<WsFrame>> {
        self.queue.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Enqueue a frame. When the queue is full, the oldest droppable
    /// frame is shed; if none is droppable and the new frame is, the new
    /// frame is shed instead. Critical frames always enter the queue.
    pub fn push(&self, frame: WsFrame) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.lock();
            if queue.len() >= self.capacity {
                if let Some(index) = queue.iter().position(WsFrame::is_droppable) {
                    queue.remove(index);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                } else if frame.is_droppable() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                // queue full of critical frames and a critical newcomer:
                // grow past the bound rather than lose it
            }
            queue.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Await the next frame; `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<WsFrame> {
        loop {
            if let Some(frame) = self.lock().pop_front() {
                return Some(frame);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue; the writer drains what remains and exits.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// One client session, bound to a player entity.
pub struct Session {
    pub id: SessionId,
    pub player: EntityId,
    pub created_at: DateTime<Utc>,
    liveness: Mutex<Liveness>,
    pub outbound: Outbound,
    /// Set while a WebSocket writer is attached
    pub ws_connected: AtomicBool,
}

impl Session {
    fn lock_liveness(&self) -> std::sync::MutexGuard<'_, Liveness> {
        self.liveness
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.lock_liveness().expires_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.lock_liveness().last_activity
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.lock_liveness().expires_at
    }

    /// Refresh activity and extend the TTL.
    pub fn touch(&self, now: DateTime<Utc>, timeout: Duration) {
        let mut liveness = self.lock_liveness();
        liveness.last_activity = now;
        liveness.expires_at = now
            + chrono::Duration::from_std(timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
    }
}

/// Concurrent map from session id to session record.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    timeout: Duration,
    queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
        }
    }

    #[cfg(test)]
    pub fn with_queue_capacity(timeout: Duration, queue_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
            queue_capacity,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create a session bound to a player entity.
    pub fn create(&self, player: EntityId) -> Arc<Session> {
        let now = Utc::now();
        let session = Arc::new(Session {
            id: SessionId::new(),
            player,
            created_at: now,
            liveness: Mutex::new(Liveness {
                expires_at: now
                    + chrono::Duration::from_std(self.timeout)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60)),
                last_activity: now,
            }),
            outbound: Outbound::new(self.queue_capacity),
            ws_connected: AtomicBool::new(false),
        });
        self.sessions.insert(session.id, session.clone());
        session
    }

    /// Look up a session, enforcing expiry. A live hit refreshes the TTL.
    pub fn authenticate(&self, id: SessionId) -> Result<Arc<Session>, SessionError> {
        let session = self
            .sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::NotFound)?;
        let now = Utc::now();
        if session.is_expired(now) {
            return Err(SessionError::Expired);
        }
        session.touch(now, self.timeout);
        Ok(session)
    }

    /// Look up without refreshing (read-only checks, fan-out).
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, session)| {
            session.outbound.close();
            session
        })
    }

    /// Remove every session whose expiry has passed, returning them for
    /// the caller to clean up (player entity, events).
    pub fn sweep_expired(&self) -> Vec<Arc<Session>> {
        let now = Utc::now();
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }

    /// Fan an event frame out to every session's queue.
    pub fn broadcast(&self, frame: &WsFrame) {
        for entry in self.sessions.iter() {
            entry.value().outbound.push(frame.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
