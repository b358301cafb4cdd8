use serde::{Deserialize, Serialize};

use crate::processor::Result;

/// Columns that make up the `byRoute` grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteLayout {
    pub origin: String,
    pub destination: String,
    /// Unsigned integer columns summed per route; any other column, or one
    /// absent from the dataset, is skipped.
    pub measures: Vec<String>,
}

impl Default for RouteLayout {
    fn default() -> Self {
        Self {
            origin: "Origin_airport".into(),
            destination: "Destination_airport".into(),
            measures: vec!["Passengers".into(), "Seats".into(), "Flights".into()],
        }
    }
}

/// Source columns of a `WebGL` render record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebGlLayout {
    pub origin_long: String,
    pub origin_lat: String,
    pub destination_long: String,
    pub destination_lat: String,
    pub weight: String,
    pub length: String,
}

impl Default for WebGlLayout {
    fn default() -> Self {
        Self {
            origin_long: "Org_airport_long".into(),
            origin_lat: "Org_airport_lat".into(),
            destination_long: "Dest_airport_long".into(),
            destination_lat: "Dest_airport_lat".into(),
            weight: "Passengers".into(),
            length: "Distance".into(),
        }
    }
}

/// Engine settings. Every field has a default, so a partial JSON document is
/// enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the worker pool; query worker counts are clamped to it.
    pub max_workers: usize,
    pub raw_result_capacity: u32,
    pub table_capacity: u32,
    pub route: RouteLayout,
    pub webgl: WebGlLayout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            raw_result_capacity: 1000,
            table_capacity: 35_000,
            route: RouteLayout::default(),
            webgl: WebGlLayout::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_raw_result_capacity(mut self, capacity: u32) -> Self {
        self.raw_result_capacity = capacity;
        self
    }

    pub fn with_table_capacity(mut self, capacity: u32) -> Self {
        self.table_capacity = capacity;
        self
    }

    pub fn with_route(mut self, route: RouteLayout) -> Self {
        self.route = route;
        self
    }

    pub fn with_webgl(mut self, webgl: WebGlLayout) -> Self {
        self.webgl = webgl;
        self
    }
}
