//! In-memory rate limiting for websocket traffic.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<Uuid, VecDeque<Instant>>`,
//! keyed by socket id. Two limits enforced:
//! - Draw events: 50 per rolling 5-second window
//! - Chat/guess events: 10 per rolling 60-second window
//!
//! Exceedance yields a single error reply to the offender and the event is
//! dropped. Buckets are removed on disconnect and garbage-collected by the
//! sweeper so idle sockets never pin memory.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

const DRAW_LIMIT: usize = 50;
const DRAW_WINDOW: Duration = Duration::from_secs(5);

const CHAT_LIMIT: usize = 10;
const CHAT_WINDOW: Duration = Duration::from_secs(60);

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("drawing too fast (max {DRAW_LIMIT} strokes per 5s)")]
    DrawExceeded,
    #[error("sending messages too fast (max {CHAT_LIMIT} per minute)")]
    ChatExceeded,
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: std::sync::Arc<Mutex<RateLimiterInner>>,
}

struct RateLimiterInner {
    /// Draw-event timestamps per socket.
    draw: HashMap<Uuid, VecDeque<Instant>>,
    /// Chat/guess-event timestamps per socket.
    chat: HashMap<Uuid, VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(RateLimiterInner {
                draw: HashMap::new(),
                chat: HashMap::new(),
            })),
        }
    }

    /// Check the draw-event window, then record the event.
    ///
    /// # Errors
    ///
    /// Returns `DrawExceeded` when the socket is over its window.
    pub fn check_draw(&self, socket_id: Uuid) -> Result<(), RateLimitError> {
        self.check_draw_at(socket_id, Instant::now())
    }

    fn check_draw_at(&self, socket_id: Uuid, now: Instant) -> Result<(), RateLimitError> {
        let mut inner = self.inner.lock().unwrap();
        let deque = inner.draw.entry(socket_id).or_default();
        prune_window(deque, now, DRAW_WINDOW);
        if deque.len() >= DRAW_LIMIT {
            return Err(RateLimitError::DrawExceeded);
        }
        deque.push_back(now);
        Ok(())
    }

    /// Check the chat/guess window, then record the event.
    ///
    /// # Errors
    ///
    /// Returns `ChatExceeded` when the socket is over its window.
    pub fn check_chat(&self, socket_id: Uuid) -> Result<(), RateLimitError> {
        self.check_chat_at(socket_id, Instant::now())
    }

    fn check_chat_at(&self, socket_id: Uuid, now: Instant) -> Result<(), RateLimitError> {
        let mut inner = self.inner.lock().unwrap();
        let deque = inner.chat.entry(socket_id).or_default();
        prune_window(deque, now, CHAT_WINDOW);
        if deque.len() >= CHAT_LIMIT {
            return Err(RateLimitError::ChatExceeded);
        }
        deque.push_back(now);
        Ok(())
    }

    /// Drop all buckets for a socket. Called on disconnect and room teardown.
    pub fn remove_socket(&self, socket_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        inner.draw.remove(&socket_id);
        inner.chat.remove(&socket_id);
    }

    /// Garbage-collect buckets whose every entry has aged out.
    pub fn gc(&self) {
        self.gc_at(Instant::now());
    }

    fn gc_at(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        inner.draw.retain(|_, deque| {
            prune_window(deque, now, DRAW_WINDOW);
            !deque.is_empty()
        });
        inner.chat.retain(|_, deque| {
            prune_window(deque, now, CHAT_WINDOW);
            !deque.is_empty()
        });
    }

    /// Number of live buckets across both maps. Used by tests and logging.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.draw.len() + inner.chat.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
