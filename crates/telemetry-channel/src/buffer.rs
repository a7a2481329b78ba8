// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The live batch buffer and the batches it hands off.
//!
//! Serialized envelopes are kept as owned strings and only joined into a
//! JSON-lines payload when the buffer is taken, so appending never copies
//! previously queued records.

/// Ordered, append-only sequence of serialized records.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    items: Vec<String>,
    payload_bytes: usize,
}

impl BatchBuffer {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            payload_bytes: 0,
        }
    }

    pub fn push(&mut self, item: String) {
        // one byte for the line terminator
        self.payload_bytes += item.len() + 1;
        self.items.push(item);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drains every queued record into a [`Batch`], leaving the buffer empty
    /// with its capacity reserved for the next batch. Returns `None` when
    /// there is nothing to hand off.
    pub fn take(&mut self) -> Option<Batch> {
        if self.items.is_empty() {
            return None;
        }

        let capacity = self.items.capacity();
        let items = std::mem::replace(&mut self.items, Vec::with_capacity(capacity));
        let mut payload = String::with_capacity(std::mem::take(&mut self.payload_bytes));
        for item in &items {
            payload.push_str(item);
            payload.push('\n');
        }

        Some(Batch {
            payload,
            count: items.len(),
        })
    }
}

/// A finished batch: newline-delimited JSON envelopes plus their count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    payload: String,
    count: usize,
}

impl Batch {
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Each record of the batch, one JSON object per item.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.payload.lines()
    }

    #[must_use]
    pub fn into_payload(self) -> String {
        self.payload
    }
}
