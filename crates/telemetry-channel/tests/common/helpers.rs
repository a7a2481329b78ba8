// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for building channels and reading batches

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use telemetry_channel::{
    Batch, BatchConfig, Channel, ChannelConfig, ContextProvider, PersistenceSink,
    TelemetryContext,
};

#[allow(dead_code)]
pub fn batch_config(max_batch_size: usize) -> BatchConfig {
    BatchConfig {
        max_batch_size,
        batch_interval: Duration::from_secs(15),
        max_in_flight_flushes: 1,
    }
}

#[allow(dead_code)]
pub fn create_channel(batch: BatchConfig, sink: Arc<dyn PersistenceSink>) -> Channel {
    create_channel_with_context(batch, sink, Arc::new(TelemetryContext::new()))
}

#[allow(dead_code)]
pub fn create_channel_with_context(
    batch: BatchConfig,
    sink: Arc<dyn PersistenceSink>,
    context: Arc<dyn ContextProvider>,
) -> Channel {
    Channel::new(ChannelConfig {
        batch,
        context,
        sink,
        failure_tx: None,
    })
    .expect("failed to create channel")
}

/// Parses every line of the batch as an envelope
#[allow(dead_code)]
pub fn envelopes(batch: &Batch) -> Vec<Value> {
    batch
        .lines()
        .map(|line| serde_json::from_str(line).expect("batch line is not valid JSON"))
        .collect()
}

/// Event names in batch order
#[allow(dead_code)]
pub fn event_names(batch: &Batch) -> Vec<String> {
    envelopes(batch)
        .iter()
        .map(|envelope| {
            envelope["data"]["baseData"]["name"]
                .as_str()
                .expect("envelope has no event name")
                .to_string()
        })
        .collect()
}
