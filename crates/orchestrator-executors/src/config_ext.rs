// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Small accessors over a step's (already-interpolated) config map, shared
//! by every executor in this crate.

use std::collections::HashMap;

use crate::error::{ExecutorError, Result};

pub fn require_str<'a>(config: &'a HashMap<String, serde_json::Value>, key: &str) -> Result<&'a str> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::MissingConfig(key.to_string()))
}

pub fn str_or<'a>(config: &'a HashMap<String, serde_json::Value>, key: &str, default: &'a str) -> &'a str {
    config.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

pub fn string_map(config: &HashMap<String, serde_json::Value>, key: &str) -> HashMap<String, String> {
    config
        .get(key)
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
