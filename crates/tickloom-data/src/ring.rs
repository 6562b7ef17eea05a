//! Lock-free ring-buffer ingest.
//!
//! Data producers (sensor pollers, app threads) run off the frame loop
//! and must never be able to stall it. Each named buffer is a fixed
//! capacity lock-free queue: one producer pushes, consumers drain up to
//! the current tick. On overflow the *oldest unread* sample is dropped
//! and the push reports it, so the orchestrator can count drops.
//!
//! The queue is a `crossbeam` `ArrayQueue`, whose atomic head/tail
//! indices use release/acquire ordering — a consumer that sees the tail
//! advance also sees the sample the producer wrote.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};

use tickloom_anim::Tick;
use tickloom_expr::Value;

use crate::DataError;

/// Cap on text and blob sample payloads.
pub const MAX_VALUE_BYTES: usize = 64;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// A scalar sample value.
///
/// Deliberately small: numbers, bools, short text, tiny blobs. Anything
/// larger belongs outside the frame pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum SampleValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Blob(Vec<u8>),
}

impl SampleValue {
    /// Validates the size cap for text and blob payloads.
    ///
    /// # Errors
    /// [`DataError::ValueTooLarge`] when the payload exceeds
    /// [`MAX_VALUE_BYTES`].
    pub fn checked(self, name: &str) -> Result<Self, DataError> {
        let size = match &self {
            Self::Number(_) | Self::Bool(_) => 0,
            Self::Text(s) => s.len(),
            Self::Blob(b) => b.len(),
        };
        if size > MAX_VALUE_BYTES {
            return Err(DataError::ValueTooLarge {
                name: name.to_string(),
                size,
                cap: MAX_VALUE_BYTES,
            });
        }
        Ok(self)
    }

    /// Converts to an expression-layer value. Blobs become their length
    /// — expressions have no byte-string operations.
    pub fn to_expr_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::Number(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Blob(b) => Value::Number(b.len() as f64),
        }
    }
}

/// One named data sample, tagged with the tick it was observed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    pub value: SampleValue,
    pub observed_tick: Tick,
}

impl Sample {
    pub fn new(
        name: impl Into<String>,
        value: SampleValue,
        observed_tick: Tick,
    ) -> Result<Self, DataError> {
        let name = name.into();
        let value = value.checked(&name)?;
        Ok(Self {
            name,
            value,
            observed_tick,
        })
    }
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

/// A fixed-capacity, single-producer ring of samples.
///
/// `push` never blocks; when full it displaces the oldest unread sample.
/// Clone handles share the underlying queue (`Arc`), which is how the
/// producer side is handed to another thread.
#[derive(Clone)]
pub struct RingBuffer {
    queue: Arc<ArrayQueue<Sample>>,
    dropped: Arc<AtomicU64>,
}

impl RingBuffer {
    /// Creates a buffer holding at most `capacity` samples.
    /// Capacity 0 is rounded up to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pushes a sample; returns `true` if an oldest unread sample was
    /// dropped to make room.
    pub fn push(&self, sample: Sample) -> bool {
        match self.queue.force_push(sample) {
            None => false,
            Some(displaced) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    name = %displaced.name,
                    observed_tick = displaced.observed_tick,
                    "ring buffer full, oldest sample dropped"
                );
                true
            }
        }
    }

    /// Total samples dropped by overflow since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

/// The consuming side of a ring buffer.
///
/// The queue itself has no peek, so a sample popped ahead of its tick
/// is parked in `lookahead` and delivered by the next drain. One cursor
/// per consumer; consumers share the queue but each sample is delivered
/// exactly once across all of them.
#[derive(Debug)]
pub struct DrainCursor {
    buffer: RingBuffer,
    lookahead: Option<Sample>,
}

impl DrainCursor {
    pub fn new(buffer: RingBuffer) -> Self {
        Self {
            buffer,
            lookahead: None,
        }
    }

    /// Returns every undrained sample with `observed_tick <= t`, in
    /// arrival order. Non-blocking.
    ///
    /// Producers push in observed-tick order, so the first sample from
    /// the future ends the drain.
    pub fn drain_for_tick(&mut self, t: Tick) -> Vec<Sample> {
        let mut out = Vec::new();
        if let Some(parked) = self.lookahead.take() {
            if parked.observed_tick <= t {
                out.push(parked);
            } else {
                self.lookahead = Some(parked);
                return out;
            }
        }
        while let Some(sample) = self.buffer.queue.pop() {
            if sample.observed_tick <= t {
                out.push(sample);
            } else {
                self.lookahead = Some(sample);
                break;
            }
        }
        out
    }
}

// =========================================================================
// Tests
// =========================================================================
