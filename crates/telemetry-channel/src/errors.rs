// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// A record could not be rendered into an envelope. The record is dropped.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record serialized to a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// The sink failed to store a batch. The batch is not re-queued.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write batch: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence is saturated")]
    Saturated,

    #[error("batch rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max batch size must be at least 1")]
    InvalidBatchSize,

    #[error("batch interval must be greater than zero")]
    InvalidInterval,

    #[error("max in-flight flushes must be at least 1")]
    InvalidInFlight,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to install log subscriber: {0}")]
    Logging(String),

    #[error("shutdown timeout exceeded")]
    ShutdownTimeout,
}
