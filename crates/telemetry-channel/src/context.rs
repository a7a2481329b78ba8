// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Well-known context keys.
pub mod keys {
    pub const APPLICATION_VERSION: &str = "ai.application.ver";
    pub const DEVICE_ID: &str = "ai.device.id";
    pub const DEVICE_MODEL: &str = "ai.device.model";
    pub const DEVICE_OS_VERSION: &str = "ai.device.osVersion";
    pub const SESSION_ID: &str = "ai.session.id";
    pub const SESSION_IS_NEW: &str = "ai.session.isNew";
    pub const USER_ID: &str = "ai.user.id";
}

/// Supplies the fields merged into every envelope. Queried once per record,
/// so the returned map reflects the context at the time of serialization.
pub trait ContextProvider: Send + Sync {
    fn context(&self) -> BTreeMap<String, String>;
}

/// Mutable context shared between the host application and the channel.
#[derive(Debug, Default)]
pub struct TelemetryContext {
    fields: RwLock<BTreeMap<String, String>>,
}

impl TelemetryContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: RwLock::new(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}

impl ContextProvider for TelemetryContext {
    fn context(&self) -> BTreeMap<String, String> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
