// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for finished batches.
//!
//! The channel calls [`PersistenceSink::persist`] once per flush and never
//! retries; recovering a failed batch is up to the sink. A sink that cannot
//! accept more data reports it through [`PersistenceSink::is_saturated`],
//! which makes the channel drop new records instead of queueing them.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::buffer::Batch;
use crate::errors::PersistenceError;

/// Default number of batch files kept on disk before the sink saturates.
pub const DEFAULT_MAX_FILES: usize = 50;

const BATCH_FILE_EXTENSION: &str = "json";
const PARTIAL_FILE_EXTENSION: &str = "tmp";

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn persist(&self, batch: Batch) -> Result<(), PersistenceError>;

    fn is_saturated(&self) -> bool {
        false
    }
}

/// Writes every batch to its own file in a directory.
///
/// File names start with the write time in microseconds so that a
/// lexicographic listing returns batches oldest first. Each file is written
/// under a temporary name and renamed once complete; readers only ever see
/// whole batches. Writes in progress count against `max_files`, so
/// concurrent persists never exceed it.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    max_files: usize,
    slots: Mutex<Slots>,
    sequence: AtomicU64,
}

#[derive(Debug)]
struct Slots {
    files: usize,
    writing: usize,
}

/// A write in progress. Gives its slot back unless committed.
struct SlotReservation<'a> {
    sink: &'a DirectorySink,
    committed: bool,
}

impl SlotReservation<'_> {
    fn commit(mut self) {
        self.committed = true;
        let mut slots = self.sink.lock_slots();
        slots.writing = slots.writing.saturating_sub(1);
        slots.files += 1;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut slots = self.sink.lock_slots();
            slots.writing = slots.writing.saturating_sub(1);
        }
    }
}

impl DirectorySink {
    /// Opens (creating if needed) `dir`, counting batch files already there.
    pub fn new(dir: impl Into<PathBuf>, max_files: usize) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let existing = list_batch_files(&dir)?.len();
        debug!("Opened batch directory {} with {existing} files", dir.display());

        Ok(Self {
            dir,
            max_files,
            slots: Mutex::new(Slots {
                files: existing,
                writing: 0,
            }),
            sequence: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persisted batch files, oldest first.
    pub fn batch_files(&self) -> io::Result<Vec<PathBuf>> {
        list_batch_files(&self.dir)
    }

    /// Recounts the files on disk, e.g. after an uploader removed some.
    /// Writes still in progress keep their slots.
    pub fn refresh(&self) -> io::Result<usize> {
        let count = list_batch_files(&self.dir)?.len();
        self.lock_slots().files = count;
        Ok(count)
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self) -> Result<SlotReservation<'_>, PersistenceError> {
        let mut slots = self.lock_slots();
        if slots.files + slots.writing >= self.max_files {
            return Err(PersistenceError::Saturated);
        }
        slots.writing += 1;
        Ok(SlotReservation {
            sink: self,
            committed: false,
        })
    }

    fn next_file_stem(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{:020}-{sequence:06}", Utc::now().timestamp_micros())
    }
}

#[async_trait]
impl PersistenceSink for DirectorySink {
    async fn persist(&self, batch: Batch) -> Result<(), PersistenceError> {
        let reservation = self.reserve()?;

        let stem = self.next_file_stem();
        let partial = self.dir.join(format!("{stem}.{PARTIAL_FILE_EXTENSION}"));
        let complete = self.dir.join(format!("{stem}.{BATCH_FILE_EXTENSION}"));
        let count = batch.count();

        tokio::fs::write(&partial, batch.into_payload()).await?;
        if let Err(e) = tokio::fs::rename(&partial, &complete).await {
            discard_partial(&partial).await;
            return Err(e.into());
        }

        reservation.commit();
        debug!("Wrote {count} telemetry items to {}", complete.display());
        Ok(())
    }

    fn is_saturated(&self) -> bool {
        let slots = self.lock_slots();
        slots.files + slots.writing >= self.max_files
    }
}

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Failed to remove partial batch file {}: {e}", path.display());
    }
}

fn list_batch_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(BATCH_FILE_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
