// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The telemetry channel: queueing, batching, flush timing and backpressure.
//!
//! All mutable state (the live buffer, the in-flight flush count and the
//! timer deadline) sits behind one mutex. Appending a record, checking the
//! batch-size threshold and swapping the buffer out happen in the same locked
//! section, and the flush timer goes through that same lock. Writing a batch
//! to the sink happens after the lock is released, on a task owned by the
//! channel, so producers keep filling a fresh buffer while I/O is pending.
//!
//! # Backpressure
//!
//! Only `max_in_flight_flushes` automatic flushes are handed to the sink at
//! once. When that many are pending and the live buffer fills up again the
//! channel reports busy and drops new records until a flush completes. A
//! saturated sink makes the channel busy as well.
//!
//! # Flush timer
//!
//! The timer is armed by the first enqueue after an idle period and disarms
//! itself when it fires on an empty buffer, so an idle channel never wakes
//! up. Every flush pushes the next deadline to `now + batch_interval`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::buffer::{Batch, BatchBuffer};
use crate::config::{self, BatchConfig};
use crate::context::ContextProvider;
use crate::envelope;
use crate::errors::{ChannelError, ConfigError, PersistenceError};
use crate::persistence::PersistenceSink;
use crate::record::TelemetryData;

/// Everything needed to build a [`Channel`].
pub struct ChannelConfig {
    pub batch: BatchConfig,
    pub context: Arc<dyn ContextProvider>,
    pub sink: Arc<dyn PersistenceSink>,
    /// Receives a [`FlushFailure`] for every batch the sink rejected.
    pub failure_tx: Option<mpsc::UnboundedSender<FlushFailure>>,
}

/// A batch the sink failed to persist. The items are gone from the channel.
#[derive(Debug)]
pub struct FlushFailure {
    pub count: usize,
    pub error: PersistenceError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued; the sink was not called.
    Empty,
    Persisted { count: usize },
    Failed { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Accumulating,
    Flushing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub enqueued: u64,
    pub dropped_busy: u64,
    pub dropped_serialization: u64,
    pub flushed_batches: u64,
    pub flushed_items: u64,
    pub failed_batches: u64,
    pub failed_items: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_serialization: AtomicU64,
    flushed_batches: AtomicU64,
    flushed_items: AtomicU64,
    failed_batches: AtomicU64,
    failed_items: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, value: usize) {
        counter.fetch_add(value as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            dropped_serialization: self.dropped_serialization.load(Ordering::Relaxed),
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            flushed_items: self.flushed_items.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_items: self.failed_items.load(Ordering::Relaxed),
        }
    }
}

struct State {
    buffer: BatchBuffer,
    config: BatchConfig,
    in_flight: usize,
    timer_armed: bool,
    next_deadline: Instant,
}

impl State {
    fn is_full(&self) -> bool {
        self.buffer.len() >= self.config.max_batch_size
    }

    fn can_flush(&self) -> bool {
        self.in_flight < self.config.max_in_flight_flushes
    }

    /// Full buffer that cannot be handed off yet.
    fn is_backlogged(&self) -> bool {
        self.is_full() && !self.can_flush()
    }

    fn reset_deadline(&mut self) {
        self.next_deadline = Instant::now() + self.config.batch_interval;
    }
}

struct Inner {
    state: Mutex<State>,
    context: Arc<dyn ContextProvider>,
    sink: Arc<dyn PersistenceSink>,
    failure_tx: Option<mpsc::UnboundedSender<FlushFailure>>,
    counters: Counters,
    runtime: Handle,
    tracker: TaskTracker,
    cancel_token: CancellationToken,
}

/// A swapped-out batch counted as in flight until this value is dropped.
struct PendingFlush {
    batch: Batch,
    guard: InFlightGuard,
}

struct InFlightGuard {
    inner: Arc<Inner>,
    released: bool,
}

impl InFlightGuard {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            released: false,
        }
    }

    /// Ends the flush. A buffer that filled up while it was pending is
    /// swapped out in the same locked section, so no enqueue can observe the
    /// freed slot and append past `max_batch_size` in between.
    fn complete(mut self) -> Option<PendingFlush> {
        self.released = true;
        let mut state = self.inner.lock_state();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.is_full() {
            self.inner.take_automatic(&mut state)
        } else {
            None
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut state = self.inner.lock_state();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swaps the live buffer out. `None` when it is empty.
    fn take(self: &Arc<Self>, state: &mut State) -> Option<PendingFlush> {
        let batch = state.buffer.take()?;
        state.in_flight += 1;
        state.reset_deadline();
        Some(PendingFlush {
            batch,
            guard: InFlightGuard::new(Arc::clone(self)),
        })
    }

    /// Like [`Inner::take`] but honours the in-flight limit.
    fn take_automatic(self: &Arc<Self>, state: &mut State) -> Option<PendingFlush> {
        if !state.can_flush() {
            debug!(
                "Deferring flush of {} telemetry items, {} flushes in flight",
                state.buffer.len(),
                state.in_flight
            );
            return None;
        }
        self.take(state)
    }

    fn spawn_persist(self: &Arc<Self>, pending: PendingFlush) {
        let inner = Arc::clone(self);
        self.tracker.spawn_on(
            async move {
                inner.persist(pending).await;
            },
            &self.runtime,
        );
    }

    /// Writes one batch, then hands off any backlog that built up meanwhile.
    async fn persist(self: &Arc<Self>, pending: PendingFlush) -> FlushOutcome {
        let PendingFlush { batch, guard } = pending;
        let count = batch.count();
        debug!("Persisting batch of {count} telemetry items");

        let result = self.sink.persist(batch).await;

        let outcome = match result {
            Ok(()) => {
                Counters::add(&self.counters.flushed_batches, 1);
                Counters::add(&self.counters.flushed_items, count);
                FlushOutcome::Persisted { count }
            }
            Err(e) => {
                error!("Failed to persist batch of {count} telemetry items: {e}");
                Counters::add(&self.counters.failed_batches, 1);
                Counters::add(&self.counters.failed_items, count);
                if let Some(tx) = &self.failure_tx {
                    if tx.send(FlushFailure { count, error: e }).is_err() {
                        debug!("Flush failure receiver dropped");
                    }
                }
                FlushOutcome::Failed { count }
            }
        };
        if let Some(backlog) = guard.complete() {
            debug!("Flushing {} backlogged telemetry items", backlog.batch.count());
            self.spawn_persist(backlog);
        }
        outcome
    }

    fn arm_timer(self: &Arc<Self>, state: &mut State) {
        if state.timer_armed || self.cancel_token.is_cancelled() {
            return;
        }
        state.timer_armed = true;
        state.reset_deadline();
        debug!("Arming flush timer for {:?}", state.config.batch_interval);
        self.tracker
            .spawn_on(run_flush_timer(Arc::clone(self)), &self.runtime);
    }
}

async fn run_flush_timer(inner: Arc<Inner>) {
    loop {
        let deadline = inner.lock_state().next_deadline;
        tokio::select! {
            () = inner.cancel_token.cancelled() => {
                debug!("Flush timer cancelled");
                break;
            }
            () = sleep_until(deadline) => {}
        }

        let pending = {
            let mut state = inner.lock_state();
            if Instant::now() < state.next_deadline {
                // a flush moved the deadline while we slept
                continue;
            }
            if state.buffer.is_empty() {
                state.timer_armed = false;
                debug!("Flush timer disarmed, buffer is idle");
                break;
            }
            match inner.take_automatic(&mut state) {
                Some(pending) => pending,
                None => {
                    state.reset_deadline();
                    continue;
                }
            }
        };
        debug!("Flush timer fired with {} telemetry items", pending.batch.count());
        inner.spawn_persist(pending);
    }
}

/// Queues telemetry records and hands them to a [`PersistenceSink`] in
/// batches.
///
/// The channel is `Send + Sync`; share it behind an `Arc` to enqueue from
/// several threads or tasks. Dropping it stops the flush timer without
/// flushing; call [`Channel::shutdown`] first to persist what is queued.
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Builds a channel on the current tokio runtime.
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        let runtime = Handle::try_current()?;
        Self::new_with_handle(config, runtime)
    }

    /// Builds a channel whose timer and sink writes run on `runtime`. Records
    /// may then be enqueued from any thread.
    pub fn new_with_handle(config: ChannelConfig, runtime: Handle) -> Result<Self, ChannelError> {
        config.batch.validate()?;

        let state = State {
            buffer: BatchBuffer::with_capacity(config.batch.max_batch_size),
            config: config.batch,
            in_flight: 0,
            timer_armed: false,
            next_deadline: Instant::now(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                context: config.context,
                sink: config.sink,
                failure_tx: config.failure_tx,
                counters: Counters::default(),
                runtime,
                tracker: TaskTracker::new(),
                cancel_token: CancellationToken::new(),
            }),
        })
    }

    /// Queues one record. Dropped without effect when the channel is busy or
    /// the record cannot be serialized. Reaching `max_batch_size` hands the
    /// buffer off before this returns.
    pub fn enqueue<R: TelemetryData>(&self, record: R) {
        if self.is_queue_busy() {
            self.drop_busy(record.data_type_name());
            return;
        }

        let line = match envelope::serialize_record(&record, self.inner.context.context()) {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping telemetry record {}: {e}", record.data_type_name());
                Counters::add(&self.inner.counters.dropped_serialization, 1);
                return;
            }
        };

        let pending = {
            let mut state = self.inner.lock_state();
            if state.is_backlogged() {
                drop(state);
                self.drop_busy(record.data_type_name());
                return;
            }
            state.buffer.push(line);
            Counters::add(&self.inner.counters.enqueued, 1);
            self.inner.arm_timer(&mut state);

            if state.is_full() {
                self.inner.take_automatic(&mut state)
            } else {
                None
            }
        };

        if let Some(pending) = pending {
            debug!("Batch size reached, flushing {} telemetry items", pending.batch.count());
            self.inner.spawn_persist(pending);
        }
    }

    fn drop_busy(&self, data_type: &str) {
        debug!("Telemetry queue busy, dropping {data_type}");
        Counters::add(&self.inner.counters.dropped_busy, 1);
    }

    /// Persists everything currently queued and waits for the sink.
    ///
    /// Unlike threshold and timer flushes this ignores the in-flight limit.
    pub async fn persist_data_item_queue(&self) -> FlushOutcome {
        let pending = {
            let mut state = self.inner.lock_state();
            self.inner.take(&mut state)
        };

        match pending {
            Some(pending) => self.inner.persist(pending).await,
            None => {
                debug!("No telemetry items to persist");
                FlushOutcome::Empty
            }
        }
    }

    /// Whether new records would be dropped right now.
    #[must_use]
    pub fn is_queue_busy(&self) -> bool {
        self.inner.sink.is_saturated() || self.inner.lock_state().is_backlogged()
    }

    /// Applies to the next flush decision. A buffer already above the new
    /// size is handed off by the next enqueue.
    pub fn set_max_batch_size(&self, max_batch_size: usize) -> Result<(), ConfigError> {
        config::validate_max_batch_size(max_batch_size)?;
        self.inner.lock_state().config.max_batch_size = max_batch_size;
        Ok(())
    }

    /// Applies from the next time the flush deadline is reset.
    pub fn set_batch_interval(&self, batch_interval: Duration) -> Result<(), ConfigError> {
        config::validate_batch_interval(batch_interval)?;
        self.inner.lock_state().config.batch_interval = batch_interval;
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> BatchConfig {
        self.inner.lock_state().config.clone()
    }

    /// Records in the live buffer.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.inner.lock_state().buffer.len()
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        let state = self.inner.lock_state();
        if state.in_flight > 0 {
            ChannelState::Flushing
        } else if state.buffer.is_empty() {
            ChannelState::Idle
        } else {
            ChannelState::Accumulating
        }
    }

    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.inner.counters.snapshot()
    }

    /// Stops the flush timer, persists what is queued and waits for pending
    /// flushes, giving up after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<FlushOutcome, ChannelError> {
        debug!("Shutting down telemetry channel");
        self.inner.cancel_token.cancel();
        self.inner.tracker.close();

        let drain = async {
            let outcome = self.persist_data_item_queue().await;
            self.inner.tracker.wait().await;
            outcome
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                warn!("Telemetry channel shutdown timed out after {timeout:?}");
                Err(ChannelError::ShutdownTimeout)
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.inner.cancel_token.cancel();
    }
}
