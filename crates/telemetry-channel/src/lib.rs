// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching channel for application telemetry.
//!
//! Records (events, metrics, exceptions, traces) are wrapped in an envelope
//! together with the current context, serialized to JSON and accumulated in a
//! batch buffer. Once the buffer reaches the configured batch size, or the
//! flush interval elapses, the whole buffer is swapped out and handed to a
//! [`persistence::PersistenceSink`] as a single JSON-lines payload.
//!
//! ```text
//!  producers ──enqueue──▶ Channel ──swap──▶ Batch ──persist──▶ PersistenceSink
//!                           ▲
//!                 flush timer (same lock)
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod channel;
pub mod config;
pub mod context;
pub mod envelope;
pub mod errors;
pub mod logger;
pub mod persistence;
pub mod record;

pub use buffer::Batch;
pub use channel::{Channel, ChannelConfig, ChannelState, ChannelStats, FlushFailure, FlushOutcome};
pub use config::BatchConfig;
pub use context::{ContextProvider, TelemetryContext};
pub use persistence::{DirectorySink, PersistenceSink};
pub use record::TelemetryData;
