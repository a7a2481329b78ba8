// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry records accepted by the channel.
//!
//! Any type that serializes to a JSON object can be enqueued once it names
//! its envelope and data types. [`EventData`] and [`MetricData`] cover the
//! common cases.

use std::collections::BTreeMap;

use serde::Serialize;

const SCHEMA_VERSION: u32 = 2;

pub trait TelemetryData: Serialize + Send {
    /// Name written to the envelope, e.g. `Microsoft.ApplicationInsights.Event`.
    fn envelope_type_name(&self) -> &str;

    /// Name written as the envelope's `baseType`, e.g. `EventData`.
    fn data_type_name(&self) -> &str;
}

/// A named custom event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventData {
    pub ver: u32,
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub measurements: BTreeMap<String, f64>,
}

impl EventData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            ver: SCHEMA_VERSION,
            name: name.into(),
            properties: BTreeMap::new(),
            measurements: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_measurement(mut self, key: impl Into<String>, value: f64) -> Self {
        self.measurements.insert(key.into(), value);
        self
    }
}

impl TelemetryData for EventData {
    fn envelope_type_name(&self) -> &str {
        "Microsoft.ApplicationInsights.Event"
    }

    fn data_type_name(&self) -> &str {
        "EventData"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// One or more metric samples reported together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricData {
    pub ver: u32,
    pub metrics: Vec<DataPoint>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl MetricData {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            ver: SCHEMA_VERSION,
            metrics: vec![DataPoint {
                name: name.into(),
                value,
                count: None,
            }],
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl TelemetryData for MetricData {
    fn envelope_type_name(&self) -> &str {
        "Microsoft.ApplicationInsights.Metric"
    }

    fn data_type_name(&self) -> &str {
        "MetricData"
    }
}
