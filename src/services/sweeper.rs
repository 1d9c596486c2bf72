//! Background sweeps — idle-room expiry and rate-limit bucket GC.
//!
//! DESIGN
//! ======
//! Two detached loops: every 10 minutes rooms that are empty of connected
//! players for 5 minutes, or idle for an hour regardless, are deleted along
//! with their engine timers, gateway membership, and rate-limit buckets.
//! Every 5 minutes the limiter drops fully expired buckets. Sweep failures
//! are logged and the loop continues.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::event::now_ms;
use crate::services::store;
use crate::state::AppState;

const ROOM_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A room with no connected players is deleted after 5 minutes.
const EMPTY_ROOM_TTL_MS: i64 = 5 * 60 * 1000;
/// Any room is deleted after an hour without activity.
const IDLE_ROOM_TTL_MS: i64 = 60 * 60 * 1000;

/// Spawn the idle-room sweeper. Returns a handle for shutdown.
pub fn spawn_room_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(ROOM_SWEEP_INTERVAL).await;
            sweep_rooms(&state).await;
        }
    })
}

/// Spawn the rate-limit bucket GC. Returns a handle for shutdown.
pub fn spawn_limiter_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LIMITER_SWEEP_INTERVAL).await;
            state.limiter.gc();
        }
    })
}

/// One sweep pass: collect expired room ids, then tear each down.
pub async fn sweep_rooms(state: &AppState) {
    let now = now_ms();
    let mut expired = Vec::new();

    let scan = store::for_each(&state.pool, |room| {
        let idle_ms = now - room.last_activity;
        let abandoned = room.connected_count() == 0 && idle_ms > EMPTY_ROOM_TTL_MS;
        if abandoned || idle_ms > IDLE_ROOM_TTL_MS {
            expired.push(room.room_id.clone());
        }
    })
    .await;

    if let Err(e) = scan {
        warn!(error = %e, "room sweep scan failed");
        return;
    }

    for room_id in expired {
        delete_room(state, &room_id).await;
    }
}

/// Delete a room everywhere: engine timers and flags, gateway membership,
/// rate-limit buckets for its sockets, and the stored row.
pub async fn delete_room(state: &AppState, room_id: &str) {
    state.engine.teardown(room_id);
    for socket_id in state.gateway.drop_room(room_id).await {
        state.limiter.remove_socket(socket_id);
    }
    match store::delete(&state.pool, room_id).await {
        Ok(()) => info!(%room_id, "expired room deleted"),
        Err(e) => warn!(error = %e, %room_id, "room delete failed"),
    }
}
