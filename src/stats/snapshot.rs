//! Parsing of `stats/<group>/values` answers.
//!
//! The gateway buckets values by server-assigned integer timestamps,
//! `{"2": {...}, "10": {...}}`. Keys can arrive out of order or with gaps, so
//! buckets are ordered numerically and the highest key always wins.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use super::StatGroup;
use crate::error::ApiError;

#[derive(Debug, Clone, Default)]
pub struct StatSnapshot {
    buckets: BTreeMap<u64, Map<String, Value>>,
}

impl StatSnapshot {
    /// Parse a values answer for `group`. An embedded `error` key is a
    /// [`ApiError::StatQuery`]; keys that are not integers are skipped.
    pub fn parse(group: &str, url: &str, body: &Value) -> Result<Self, ApiError> {
        let object = match body {
            Value::Object(o) => o,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(ApiError::protocol(
                    url,
                    format!("stat values are not an object: {}", other),
                ))
            }
        };

        if let Some(err) = object.get("error") {
            let message = match err {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(ApiError::StatQuery {
                group: group.to_string(),
                message,
            });
        }

        let mut buckets = BTreeMap::new();
        for (key, values) in object {
            match (key.parse::<u64>(), values) {
                (Ok(ts), Value::Object(metrics)) => {
                    buckets.insert(ts, metrics.clone());
                }
                _ => warn!(%group, %key, "skipping malformed stat bucket"),
            }
        }
        Ok(Self { buckets })
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket with the numerically highest timestamp.
    pub fn latest(&self) -> Option<(u64, &Map<String, Value>)> {
        self.buckets.iter().next_back().map(|(ts, m)| (*ts, m))
    }
}

/// Values of one group's requested metrics at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReading {
    pub group: String,
    pub timestamp: u64,
    /// Found metrics, in the caller's order.
    pub values: Vec<(String, Value)>,
    /// Requested metrics absent from the bucket.
    pub missing: Vec<String>,
}

impl GroupReading {
    /// Pick the requested metrics out of a bucket. Names match exactly;
    /// the gateway schema is case- and spelling-sensitive.
    pub fn extract(group: &StatGroup, timestamp: u64, bucket: &Map<String, Value>) -> Self {
        let mut values = Vec::new();
        let mut missing = Vec::new();
        for name in &group.metrics {
            match bucket.get(name) {
                Some(v) => values.push((name.clone(), v.clone())),
                None => missing.push(name.clone()),
            }
        }
        Self {
            group: group.name.clone(),
            timestamp,
            values,
            missing,
        }
    }

    /// Row for a tabular sink: found values only, in caller order.
    pub fn row(&self) -> Vec<Value> {
        self.values.iter().map(|(_, v)| v.clone()).collect()
    }
}
