//! Room store — persistence with optimistic concurrency.
//!
//! DESIGN
//! ======
//! The core room document lives in `rooms.data` (JSONB) guarded by the
//! `version` column: `save` is a compare-and-swap, and `update_room` is the
//! load/apply/save retry loop every engine-critical mutation goes through.
//! Hot paths avoid the CAS entirely: chat appends into its own ring-trimmed
//! table and stroke snapshots concat into the `drawing` column, both
//! fire-and-forget from the gateway.
//!
//! ERROR HANDLING
//! ==============
//! A save that matches no row under the expected version is a
//! `VersionConflict`; after three attempts `update_room` reports
//! `ConflictRetryExhausted` and the mutation is abandoned by the caller.

use sqlx::PgPool;
use tracing::warn;

use crate::room::{ChatEntry, Room, CHAT_RING_CAPACITY};

/// Attempts per optimistic mutation before giving up.
pub const MAX_SAVE_ATTEMPTS: u32 = 3;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("room not found: {0}")]
    NotFound(String),
    #[error("room id already taken: {0}")]
    Duplicate(String),
    #[error("version conflict for room {0}")]
    VersionConflict(String),
    #[error("optimistic retries exhausted for room {0}")]
    ConflictRetryExhausted(String),
    #[error("corrupt room document: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// CRUD
// =============================================================================

/// Insert a new room at version 1.
///
/// # Errors
///
/// Returns `Duplicate` when the id is already taken.
pub async fn create(pool: &PgPool, room: &Room) -> Result<(), StoreError> {
    let data = serde_json::to_value(room)?;
    let result = sqlx::query(
        "INSERT INTO rooms (id, data, drawing, version) VALUES ($1, $2, $3, 1) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(&room.room_id)
    .bind(&data)
    .bind(&room.drawing)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Duplicate(room.room_id.clone()));
    }
    Ok(())
}

/// Load a room with its version, stroke snapshot, and chat ring.
///
/// # Errors
///
/// Returns `NotFound` for unknown ids.
pub async fn load(pool: &PgPool, room_id: &str) -> Result<Room, StoreError> {
    let row = sqlx::query_as::<_, (serde_json::Value, serde_json::Value, i64, i64)>(
        "SELECT data, drawing, (extract(epoch FROM last_activity) * 1000)::bigint, version \
         FROM rooms WHERE id = $1",
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(room_id.to_string()))?;

    let (data, drawing, last_activity, version) = row;
    let mut room: Room = serde_json::from_value(data)?;
    room.drawing = drawing;
    room.last_activity = last_activity;
    room.version = version;
    room.chat = load_chat(pool, room_id).await?;
    Ok(room)
}

/// Compare-and-swap save of the core document. Also refreshes activity.
/// Returns the new version on success.
///
/// # Errors
///
/// Returns `VersionConflict` when the row moved underneath the caller.
pub async fn save(pool: &PgPool, room: &Room, expected_version: i64) -> Result<i64, StoreError> {
    let data = serde_json::to_value(room)?;
    let result = sqlx::query(
        "UPDATE rooms SET data = $2, version = version + 1, last_activity = now() \
         WHERE id = $1 AND version = $3",
    )
    .bind(&room.room_id)
    .bind(&data)
    .bind(expected_version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::VersionConflict(room.room_id.clone()));
    }
    Ok(expected_version + 1)
}

/// Delete a room. Chat rows cascade. Deleting an absent room is a no-op.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn delete(pool: &PgPool, room_id: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM rooms WHERE id = $1")
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Visit every room (without chat hydration). Used by the sweeper.
///
/// # Errors
///
/// Returns a database error if the scan fails; individual corrupt documents
/// are logged and skipped.
pub async fn for_each<F>(pool: &PgPool, mut f: F) -> Result<(), StoreError>
where
    F: FnMut(&Room),
{
    let rows = sqlx::query_as::<_, (String, serde_json::Value, i64, i64)>(
        "SELECT id, data, (extract(epoch FROM last_activity) * 1000)::bigint, version FROM rooms",
    )
    .fetch_all(pool)
    .await?;

    for (id, data, last_activity, version) in rows {
        match serde_json::from_value::<Room>(data) {
            Ok(mut room) => {
                room.last_activity = last_activity;
                room.version = version;
                f(&room);
            }
            Err(e) => warn!(room_id = %id, error = %e, "skipping corrupt room document"),
        }
    }
    Ok(())
}

/// Total and in-game room counts for the health surface.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn room_counts(pool: &PgPool) -> Result<(i64, i64), StoreError> {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT count(*), count(*) FILTER (WHERE (data->>'gameStarted')::boolean) FROM rooms",
    )
    .fetch_one(pool)
    .await?;
    Ok(counts)
}

// =============================================================================
// OPTIMISTIC UPDATE LOOP
// =============================================================================

/// Load, apply a pure mutation, and save under the loaded version, retrying
/// up to [`MAX_SAVE_ATTEMPTS`] times on conflict. The closure may run once
/// per attempt and must therefore be safe to reapply to a fresh load.
///
/// Returns the saved room (version refreshed) and the closure's value.
///
/// # Errors
///
/// Propagates the closure's error without saving, and store errors from the
/// load/save cycle; exhausted retries surface as `ConflictRetryExhausted`.
pub async fn update_room<T, E, F>(pool: &PgPool, room_id: &str, mut f: F) -> Result<(Room, T), E>
where
    F: FnMut(&mut Room) -> Result<T, E>,
    E: From<StoreError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut room = load(pool, room_id).await.map_err(E::from)?;
        let value = f(&mut room)?;
        match save(pool, &room, room.version).await {
            Ok(new_version) => {
                room.version = new_version;
                return Ok((room, value));
            }
            Err(StoreError::VersionConflict(_)) if attempt < MAX_SAVE_ATTEMPTS => {
                tracing::debug!(%room_id, attempt, "version conflict; reloading");
            }
            Err(StoreError::VersionConflict(_)) => {
                return Err(E::from(StoreError::ConflictRetryExhausted(room_id.to_string())));
            }
            Err(e) => return Err(E::from(e)),
        }
    }
}

/// Conditionally credit a correct guess: no-op (returns false) if the
/// session is the drawer, unknown, or already credited this turn. This is
/// the idempotence barrier behind the broadcast-before-persist guess path.
///
/// # Errors
///
/// Propagates load/save failures; conflicts retry like `update_room`.
pub async fn apply_correct_guess(
    pool: &PgPool,
    room_id: &str,
    session_id: &str,
    points: i64,
) -> Result<bool, StoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut room = load(pool, room_id).await?;
        if !room.credit_guess(session_id, points) {
            return Ok(false);
        }
        match save(pool, &room, room.version).await {
            Ok(_) => return Ok(true),
            Err(StoreError::VersionConflict(_)) if attempt < MAX_SAVE_ATTEMPTS => {}
            Err(StoreError::VersionConflict(_)) => {
                return Err(StoreError::ConflictRetryExhausted(room_id.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// HOT-PATH UPDATES
// =============================================================================

/// Append one chat entry and trim the ring to the newest
/// [`CHAT_RING_CAPACITY`] rows, atomically within one transaction.
///
/// # Errors
///
/// Returns a database error if the append fails.
pub async fn append_chat(pool: &PgPool, room_id: &str, entry: &ChatEntry) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO room_chat (room_id, session_id, name, msg, ts) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(room_id)
    .bind(&entry.session_id)
    .bind(&entry.name)
    .bind(&entry.msg)
    .bind(entry.ts)
    .execute(tx.as_mut())
    .await?;

    sqlx::query(
        "DELETE FROM room_chat WHERE room_id = $1 AND id NOT IN \
         (SELECT id FROM room_chat WHERE room_id = $1 ORDER BY id DESC LIMIT $2)",
    )
    .bind(room_id)
    .bind(CHAT_RING_CAPACITY as i64)
    .execute(tx.as_mut())
    .await?;

    sqlx::query("UPDATE rooms SET last_activity = now() WHERE id = $1")
        .bind(room_id)
        .execute(tx.as_mut())
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Concat strokes onto the room's snapshot. Non-array payloads are wrapped
/// so the column stays a JSON array.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn append_drawing(
    pool: &PgPool,
    room_id: &str,
    lines: serde_json::Value,
) -> Result<(), StoreError> {
    let lines = if lines.is_array() { lines } else { serde_json::Value::Array(vec![lines]) };
    sqlx::query(
        "UPDATE rooms SET drawing = drawing || $2::jsonb, last_activity = now() WHERE id = $1",
    )
    .bind(room_id)
    .bind(&lines)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reset the stroke snapshot to an empty array.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn clear_drawing(pool: &PgPool, room_id: &str) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE rooms SET drawing = '[]'::jsonb, last_activity = now() WHERE id = $1",
    )
    .bind(room_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Refresh the room's activity clock.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn touch_activity(pool: &PgPool, room_id: &str) -> Result<(), StoreError> {
    sqlx::query("UPDATE rooms SET last_activity = now() WHERE id = $1")
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(())
}

// =============================================================================
// FIRE-AND-FORGET WRAPPERS
// =============================================================================

/// Spawn a detached chat append so broadcast latency never waits on the
/// database. Failures are logged and the broadcast stands.
pub fn append_chat_detached(pool: &PgPool, room_id: &str, entry: ChatEntry) {
    let pool = pool.clone();
    let room_id = room_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = append_chat(&pool, &room_id, &entry).await {
            warn!(error = %e, %room_id, "chat persist failed");
        }
    });
}

/// Spawn a detached stroke-snapshot append.
pub fn append_drawing_detached(pool: &PgPool, room_id: &str, lines: serde_json::Value) {
    let pool = pool.clone();
    let room_id = room_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = append_drawing(&pool, &room_id, lines).await {
            warn!(error = %e, %room_id, "drawing persist failed");
        }
    });
}

/// Spawn a detached snapshot clear.
pub fn clear_drawing_detached(pool: &PgPool, room_id: &str) {
    let pool = pool.clone();
    let room_id = room_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = clear_drawing(&pool, &room_id).await {
            warn!(error = %e, %room_id, "drawing clear failed");
        }
    });
}

// =============================================================================
// HELPERS
// =============================================================================

async fn load_chat(pool: &PgPool, room_id: &str) -> Result<Vec<ChatEntry>, StoreError> {
    let rows = sqlx::query_as::<_, (String, String, String, i64)>(
        "SELECT session_id, name, msg, ts FROM \
         (SELECT id, session_id, name, msg, ts FROM room_chat WHERE room_id = $1 \
          ORDER BY id DESC LIMIT $2) newest \
         ORDER BY id ASC",
    )
    .bind(room_id)
    .bind(CHAT_RING_CAPACITY as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(session_id, name, msg, ts)| ChatEntry { session_id, name, msg, ts })
        .collect())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(feature = "live-db-tests")]
#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
