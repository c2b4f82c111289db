//! Bounded batch buffer between the stream reader and the Parquet writer

use super::telemetry;
use crate::{Error, Result};
use arrow_array::RecordBatch;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default byte cap for buffered batches (128MB)
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 128 * 1024 * 1024;
/// Default cap on the number of buffered batches
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 100;

/// Counters accumulated over the lifetime of one buffer
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BufferMetrics {
    /// Batches successfully enqueued
    pub total_batches: u64,
    /// Rows successfully enqueued
    pub total_rows: u64,
    /// Bytes successfully enqueued (in-memory Arrow size)
    pub total_bytes: u64,
    /// Puts that gave up after their timeout
    pub buffer_overflows: u64,
    /// Highest queue depth observed after an enqueue
    pub max_queue_depth: usize,
}

#[derive(Debug, Default)]
struct BufferState {
    queue: VecDeque<(RecordBatch, usize)>,
    size_bytes: usize,
    closed: bool,
    metrics: BufferMetrics,
}

/// Async queue of record batches bounded by total bytes and by depth.
///
/// Producers wait while either cap is reached; nothing is ever dropped. All
/// state lives under one lock; `not_full` and `not_empty` wake the two sides.
#[derive(Debug)]
pub struct BoundedBatchBuffer {
    max_size_bytes: usize,
    max_queue_depth: usize,
    state: Mutex<BufferState>,
    not_full: Notify,
    not_empty: Notify,
}

impl BoundedBatchBuffer {
    /// Create a buffer with the given byte and depth caps
    pub fn new(max_size_bytes: usize, max_queue_depth: usize) -> Self {
        Self {
            max_size_bytes,
            max_queue_depth: max_queue_depth.max(1),
            state: Mutex::new(BufferState::default()),
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    /// Enqueue a batch, waiting while the buffer is at either cap.
    ///
    /// Fails with [`Error::BufferOverflow`] once `timeout` elapses without
    /// room, and with [`Error::BufferClosed`] if the buffer is (or becomes)
    /// closed. A failed put leaves the batch out of the queue.
    pub async fn put(&self, batch: RecordBatch, timeout: Option<Duration>) -> Result<()> {
        let batch_size = batch.get_array_memory_size();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut pending = Some(batch);

        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(Error::BufferClosed);
                }

                if !self.is_full(&state) {
                    let batch = pending
                        .take()
                        .ok_or_else(|| Error::Internal("Missing pending batch".to_string()))?;
                    let rows = batch.num_rows() as u64;

                    state.queue.push_back((batch, batch_size));
                    state.size_bytes += batch_size;
                    state.metrics.total_batches += 1;
                    state.metrics.total_rows += rows;
                    state.metrics.total_bytes += batch_size as u64;
                    let depth = state.queue.len();
                    state.metrics.max_queue_depth = state.metrics.max_queue_depth.max(depth);
                    let fullness = state.size_bytes as f64 / self.max_size_bytes.max(1) as f64;
                    drop(state);

                    telemetry::record_put(batch_size as u64, depth as u64, fullness);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        self.state.lock().metrics.buffer_overflows += 1;
                        telemetry::record_backpressure_overflow();
                        warn!(
                            batch_size,
                            timeout = ?timeout,
                            "Buffer full, timeout expired"
                        );
                        return Err(Error::BufferOverflow {
                            timeout: timeout.unwrap_or_default(),
                        });
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Dequeue the oldest batch.
    ///
    /// Returns `Ok(None)` once the buffer is closed and drained. Fails with
    /// [`Error::Timeout`] if `timeout` elapses while empty and still open.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<Option<RecordBatch>> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some((batch, size)) = state.queue.pop_front() {
                    state.size_bytes -= size;
                    drop(state);
                    self.not_full.notify_one();
                    return Ok(Some(batch));
                }
                if state.closed {
                    return Ok(None);
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(Error::Timeout);
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Close the buffer and wake every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            debug!(
                queue_depth = state.queue.len(),
                size_bytes = state.size_bytes,
                "Buffer closed"
            );
        }
        drop(state);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Bytes currently buffered
    pub fn size_bytes(&self) -> usize {
        self.state.lock().size_bytes
    }

    /// Batches currently buffered
    pub fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Snapshot of the lifetime counters
    pub fn metrics(&self) -> BufferMetrics {
        self.state.lock().metrics.clone()
    }

    /// Configured byte cap
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Configured depth cap
    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth
    }

    fn is_full(&self, state: &BufferState) -> bool {
        state.queue.len() >= self.max_queue_depth || state.size_bytes >= self.max_size_bytes
    }
}

impl Default for BoundedBatchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES, DEFAULT_MAX_QUEUE_DEPTH)
    }
}
