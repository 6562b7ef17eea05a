//! Synchronous store operations over one SQLite connection.
//!
//! The store runs in WAL mode so the writer thread and read-side
//! connections don't block each other. Related rows are written in one
//! transaction (a barrier resolution plus its released dependents'
//! state updates land atomically). Timestamps (`created_at`) are wall
//! clock — persistence is off the render path and outside the
//! determinism boundary; the engine-side `tick` columns carry the
//! deterministic time.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

use tickloom_anim::{AnimId, Tick};
use tickloom_coord::{CoordinationEvent, EventKind, PrimitiveId};
use tickloom_data::Sample;

use crate::schema;
use crate::StoreError;

/// Rows reclaimed by a sweep before an incremental vacuum is worth it.
const VACUUM_THRESHOLD_ROWS: usize = 4096;

/// One animation's persisted lifecycle row.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationRow {
    pub animation_id: AnimId,
    /// The serialized definition (deterministic JSON).
    pub definition: String,
    pub active: bool,
    pub start_tick: Option<Tick>,
    pub end_tick: Option<Tick>,
    /// Monotonic version for compare-and-set updates.
    pub updated_at: i64,
}

/// One plan's persisted row.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRow {
    pub plan_id: String,
    pub definition: String,
    pub state: Option<String>,
    pub start_tick: Option<Tick>,
    pub completion_tick: Option<Tick>,
    pub active: bool,
}

/// Embedded store over a single SQLite file (or memory, for tests).
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if needed) and migrates the database at `path`.
    ///
    /// # Errors
    /// [`StoreError::Db`] on open/pragma failures,
    /// [`StoreError::SchemaTooNew`] for a database from a newer build.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    /// See [`Store::open`].
    pub fn in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------

    /// Appends a batch of events in one transaction.
    ///
    /// # Errors
    /// [`StoreError::Db`]; the whole batch rolls back on failure.
    pub fn append_events(
        &mut self,
        events: &[CoordinationEvent],
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let now = Self::now();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO timeline_events
                     (tick, kind, primitive_id, animation_id, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for event in events {
                let animation = event
                    .payload
                    .get("animation")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let payload = if event.payload.is_null() {
                    None
                } else {
                    Some(event.payload.to_string())
                };
                stmt.execute(params![
                    event.tick as i64,
                    event.kind.as_str(),
                    event.primitive_id.as_str(),
                    animation,
                    payload,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Events with `tick` in `[t0, t1]`, in `(tick, insertion)` order.
    ///
    /// # Errors
    /// [`StoreError::Db`] or [`StoreError::CorruptPayload`].
    pub fn events_in_range(
        &self,
        t0: Tick,
        t1: Tick,
    ) -> Result<Vec<CoordinationEvent>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT tick, kind, primitive_id, payload
               FROM timeline_events
              WHERE tick >= ?1 AND tick <= ?2
              ORDER BY tick, event_id",
        )?;
        let rows = stmt.query_map(params![t0 as i64, t1 as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (tick, kind, primitive_id, payload) = row?;
            let kind: EventKind =
                serde_json::from_value(serde_json::Value::String(kind))?;
            let payload = match payload {
                Some(text) => serde_json::from_str(&text)?,
                None => serde_json::Value::Null,
            };
            events.push(CoordinationEvent {
                tick: tick as Tick,
                kind,
                primitive_id: PrimitiveId::new(primitive_id),
                payload,
            });
        }
        Ok(events)
    }

    // -----------------------------------------------------------------
    // Animations & plans
    // -----------------------------------------------------------------

    /// Inserts or replaces an animation row.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn upsert_animation(&self, row: &AnimationRow) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO animations
                 (animation_id, definition, active, start_tick, end_tick, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (animation_id) DO UPDATE SET
                 definition = excluded.definition,
                 active = excluded.active,
                 start_tick = excluded.start_tick,
                 end_tick = excluded.end_tick,
                 updated_at = excluded.updated_at",
            params![
                row.animation_id.as_str(),
                row.definition,
                row.active,
                row.start_tick.map(|t| t as i64),
                row.end_tick.map(|t| t as i64),
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Compare-and-set update of an animation's lifecycle columns.
    ///
    /// Succeeds only when the stored `updated_at` still equals
    /// `expected_version`; the new version is `expected_version + 1`.
    /// Returns `false` on a version conflict.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn update_animation_cas(
        &self,
        id: &AnimId,
        active: bool,
        start_tick: Option<Tick>,
        end_tick: Option<Tick>,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE animations
                SET active = ?2, start_tick = ?3, end_tick = ?4,
                    updated_at = ?5 + 1
              WHERE animation_id = ?1 AND updated_at = ?5",
            params![
                id.as_str(),
                active,
                start_tick.map(|t| t as i64),
                end_tick.map(|t| t as i64),
                expected_version,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Loads an animation row.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn animation(&self, id: &AnimId) -> Result<Option<AnimationRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT definition, active, start_tick, end_tick, updated_at
                   FROM animations WHERE animation_id = ?1",
                [id.as_str()],
                |row| {
                    Ok(AnimationRow {
                        animation_id: id.clone(),
                        definition: row.get(0)?,
                        active: row.get(1)?,
                        start_tick: row.get::<_, Option<i64>>(2)?.map(|t| t as Tick),
                        end_tick: row.get::<_, Option<i64>>(3)?.map(|t| t as Tick),
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Inserts or replaces a plan row.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn upsert_plan(&self, row: &PlanRow) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO coordination_plans
                 (plan_id, definition, state, start_tick, completion_tick, active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (plan_id) DO UPDATE SET
                 definition = excluded.definition,
                 state = excluded.state,
                 start_tick = excluded.start_tick,
                 completion_tick = excluded.completion_tick,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
            params![
                row.plan_id,
                row.definition,
                row.state,
                row.start_tick.map(|t| t as i64),
                row.completion_tick.map(|t| t as i64),
                row.active,
                Self::now(),
            ],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Metrics & data history
    // -----------------------------------------------------------------

    /// Records one metric sample.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn record_metric(
        &self,
        tick: Tick,
        kind: &str,
        value: f64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO performance_metrics (tick, kind, value, payload, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            params![tick as i64, kind, value, Self::now()],
        )?;
        Ok(())
    }

    /// Appends drained data samples in one transaction.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn append_data_samples(&mut self, samples: &[Sample]) -> Result<(), StoreError> {
        if samples.is_empty() {
            return Ok(());
        }
        let now = Self::now();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO data_history (name, value, tick, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for sample in samples {
                let value = serde_json::to_string(&sample.value)
                    .unwrap_or_else(|_| "null".to_string());
                stmt.execute(params![
                    sample.name,
                    value,
                    sample.observed_tick as i64,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------

    /// Stores an engine snapshot blob for `tick`.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn save_checkpoint(&self, tick: Tick, snapshot: &[u8]) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO checkpoints (tick, snapshot, created_at) VALUES (?1, ?2, ?3)",
            params![tick as i64, snapshot, Self::now()],
        )?;
        Ok(())
    }

    /// The most recent checkpoint at or before `tick`.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn checkpoint_at_or_before(
        &self,
        tick: Tick,
    ) -> Result<Option<(Tick, Vec<u8>)>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT tick, snapshot FROM checkpoints
                  WHERE tick <= ?1 ORDER BY tick DESC LIMIT 1",
                [tick as i64],
                |row| Ok((row.get::<_, i64>(0)? as Tick, row.get::<_, Vec<u8>>(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    // -----------------------------------------------------------------
    // Retention
    // -----------------------------------------------------------------

    /// Deletes append-only rows older than `horizon_tick` and vacuums
    /// when the reclaim is large enough. Returns deleted row count.
    ///
    /// Definition and plan rows are kept — they are retained while
    /// referenced, not by age.
    ///
    /// # Errors
    /// [`StoreError::Db`].
    pub fn retention_sweep(&mut self, horizon_tick: Tick) -> Result<usize, StoreError> {
        let horizon = horizon_tick as i64;
        let tx = self.conn.transaction()?;
        let mut deleted = 0usize;
        deleted += tx.execute(
            "DELETE FROM timeline_events WHERE tick < ?1",
            [horizon],
        )?;
        deleted += tx.execute(
            "DELETE FROM performance_metrics WHERE tick < ?1",
            [horizon],
        )?;
        deleted +=
            tx.execute("DELETE FROM data_history WHERE tick < ?1", [horizon])?;
        // Keep the newest checkpoint regardless of age: replay needs a
        // base.
        deleted += tx.execute(
            "DELETE FROM checkpoints
              WHERE tick < ?1
                AND checkpoint_id != (SELECT MAX(checkpoint_id) FROM checkpoints)",
            [horizon],
        )?;
        tx.commit()?;

        if deleted >= VACUUM_THRESHOLD_ROWS {
            tracing::info!(deleted, "retention sweep reclaiming space");
            self.conn.execute_batch("PRAGMA incremental_vacuum;")?;
        }
        Ok(deleted)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tickloom_data::SampleValue;

    fn event(tick: Tick, kind: EventKind, id: &str) -> CoordinationEvent {
        CoordinationEvent::new(tick, kind, PrimitiveId::new(id))
    }

    #[test]
    fn test_event_round_trip() {
        let mut store = Store::in_memory().unwrap();
        let events = vec![
            event(5, EventKind::SyncTriggered, "s"),
            event(5, EventKind::BarrierResolved, "b")
                .with_payload(json!({ "timeout": false })),
            event(9, EventKind::SequenceCompleted, "q"),
        ];
        store.append_events(&events).unwrap();

        let all = store.events_in_range(0, 100).unwrap();
        assert_eq!(all, events);

        let slice = store.events_in_range(6, 100).unwrap();
        assert_eq!(slice.len(), 1);
        assert_eq!(slice[0].tick, 9);
    }

    #[test]
    fn test_animation_upsert_and_cas() {
        let store = Store::in_memory().unwrap();
        let row = AnimationRow {
            animation_id: AnimId::new("fade"),
            definition: "{}".to_string(),
            active: false,
            start_tick: None,
            end_tick: None,
            updated_at: 0,
        };
        store.upsert_animation(&row).unwrap();

        // CAS with the right version succeeds and bumps it.
        assert!(store
            .update_animation_cas(&AnimId::new("fade"), true, Some(10), Some(70), 0)
            .unwrap());
        let loaded = store.animation(&AnimId::new("fade")).unwrap().unwrap();
        assert!(loaded.active);
        assert_eq!(loaded.start_tick, Some(10));
        assert_eq!(loaded.updated_at, 1);

        // Stale version loses.
        assert!(!store
            .update_animation_cas(&AnimId::new("fade"), false, None, None, 0)
            .unwrap());
    }

    #[test]
    fn test_data_samples_and_metrics() {
        let mut store = Store::in_memory().unwrap();
        let samples = vec![
            Sample::new("cpu", SampleValue::Number(42.0), 7).unwrap(),
            Sample::new("label", SampleValue::Text("ok".into()), 8).unwrap(),
        ];
        store.append_data_samples(&samples).unwrap();
        store.record_metric(7, "frame_missed", 1.0).unwrap();

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM data_history", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_checkpoint_lookup() {
        let store = Store::in_memory().unwrap();
        store.save_checkpoint(100, b"alpha").unwrap();
        store.save_checkpoint(200, b"beta").unwrap();

        assert_eq!(store.checkpoint_at_or_before(50).unwrap(), None);
        assert_eq!(
            store.checkpoint_at_or_before(150).unwrap(),
            Some((100, b"alpha".to_vec()))
        );
        assert_eq!(
            store.checkpoint_at_or_before(999).unwrap(),
            Some((200, b"beta".to_vec()))
        );
    }

    #[test]
    fn test_retention_sweep_keeps_recent_and_latest_checkpoint() {
        let mut store = Store::in_memory().unwrap();
        store
            .append_events(&[
                event(10, EventKind::SyncTriggered, "old"),
                event(500, EventKind::SyncTriggered, "new"),
            ])
            .unwrap();
        store.save_checkpoint(10, b"old").unwrap();
        store.record_metric(10, "frame_missed", 1.0).unwrap();

        let deleted = store.retention_sweep(100).unwrap();
        assert!(deleted >= 2);

        let remaining = store.events_in_range(0, 1000).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].tick, 500);
        // The only (latest) checkpoint survives the horizon.
        assert!(store.checkpoint_at_or_before(1000).unwrap().is_some());
    }

    #[test]
    fn test_plan_upsert() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_plan(&PlanRow {
                plan_id: "intro".to_string(),
                definition: "{\"primitives\":[]}".to_string(),
                state: Some("running".to_string()),
                start_tick: Some(0),
                completion_tick: None,
                active: true,
            })
            .unwrap();
        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM coordination_plans", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
