// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock persistence sinks

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use telemetry_channel::errors::PersistenceError;
use telemetry_channel::{Batch, PersistenceSink};
use tokio::sync::{mpsc, Semaphore};

/// Forwards every batch to a channel and counts calls
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<Batch>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Batch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                calls: AtomicUsize::new(0),
            },
            rx,
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    async fn persist(&self, batch: Batch) -> Result<(), PersistenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(batch);
        Ok(())
    }
}

/// Holds every batch until a permit is released, then forwards it
pub struct GatedSink {
    gate: Semaphore,
    tx: mpsc::UnboundedSender<Batch>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl GatedSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Batch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                gate: Semaphore::new(0),
                tx,
                calls: AtomicUsize::new(0),
            },
            rx,
        )
    }

    pub fn release(&self, batches: usize) {
        self.gate.add_permits(batches);
    }

    /// Persist calls started, including those still waiting on the gate
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceSink for GatedSink {
    async fn persist(&self, batch: Batch) -> Result<(), PersistenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| PersistenceError::Rejected(e.to_string()))?;
        permit.forget();
        let _ = self.tx.send(batch);
        Ok(())
    }
}

/// Rejects every batch
pub struct FailingSink;

#[async_trait]
impl PersistenceSink for FailingSink {
    async fn persist(&self, _batch: Batch) -> Result<(), PersistenceError> {
        Err(PersistenceError::Rejected("disk full".to_string()))
    }
}

/// Never finishes a write
pub struct StuckSink;

#[async_trait]
impl PersistenceSink for StuckSink {
    async fn persist(&self, _batch: Batch) -> Result<(), PersistenceError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}
