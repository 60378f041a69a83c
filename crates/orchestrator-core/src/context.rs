// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Execution context: the per-execution variable, output, and status store.
//!
//! All access is serialized behind `parking_lot::RwLock`-guarded maps so that
//! concurrent steps within a single execution observe a consistent
//! happens-before ordering, per the shared-resource policy in the execution
//! concurrency model.

use crate::error::{OrchestratorError, Result};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Status a step may have recorded in the context at any point during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern is valid")
    })
}

/// Process-local, per-execution state: workflow variables, step outputs,
/// resource outputs, step statuses, and the base environment overlay.
pub struct ExecutionContext {
    workflow_variables: RwLock<HashMap<String, String>>,
    step_status: RwLock<HashMap<String, StepStatus>>,
    step_outputs: RwLock<HashMap<String, HashMap<String, String>>>,
    resource_outputs: RwLock<HashMap<String, HashMap<String, String>>>,
    environment: RwLock<HashMap<String, String>>,
}

impl ExecutionContext {
    pub fn new(environment: HashMap<String, String>) -> Self {
        Self {
            workflow_variables: RwLock::new(HashMap::new()),
            step_status: RwLock::new(HashMap::new()),
            step_outputs: RwLock::new(HashMap::new()),
            resource_outputs: RwLock::new(HashMap::new()),
            environment: RwLock::new(environment),
        }
    }

    // -- workflow variables --------------------------------------------------

    pub fn set_workflow_variables(&self, vars: HashMap<String, String>) {
        let mut guard = self.workflow_variables.write();
        for (k, v) in vars {
            guard.insert(k, v);
        }
    }

    pub fn set_variable(&self, key: impl Into<String>, value: impl Into<String>) {
        self.workflow_variables.write().insert(key.into(), value.into());
    }

    pub fn get_variable(&self, key: &str) -> Option<String> {
        self.workflow_variables.read().get(key).cloned()
    }

    // -- step outputs ---------------------------------------------------------

    pub fn set_step_outputs(&self, step: &str, outputs: HashMap<String, String>) {
        self.step_outputs
            .write()
            .entry(step.to_string())
            .or_default()
            .extend(outputs);
    }

    pub fn get_step_output(&self, step: &str, key: &str) -> Option<String> {
        self.step_outputs
            .read()
            .get(step)
            .and_then(|m| m.get(key))
            .cloned()
    }

    pub fn get_all_step_outputs(&self, step: &str) -> HashMap<String, String> {
        self.step_outputs.read().get(step).cloned().unwrap_or_default()
    }

    // -- resource outputs -------------------------------------------------------

    pub fn set_resource_output(&self, resource: &str, key: impl Into<String>, value: impl Into<String>) {
        self.resource_outputs
            .write()
            .entry(resource.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn set_resource_outputs(&self, resource: &str, outputs: HashMap<String, String>) {
        self.resource_outputs
            .write()
            .entry(resource.to_string())
            .or_default()
            .extend(outputs);
    }

    pub fn get_resource_output(&self, resource: &str, key: &str) -> Option<String> {
        self.resource_outputs
            .read()
            .get(resource)
            .and_then(|m| m.get(key))
            .cloned()
    }

    // -- step status ------------------------------------------------------------

    pub fn set_step_status(&self, step: &str, status: StepStatus) {
        self.step_status.write().insert(step.to_string(), status);
    }

    pub fn get_step_status(&self, step: &str) -> Option<StepStatus> {
        self.step_status.read().get(step).copied()
    }

    /// True iff at least one step in this execution is currently `Failed`.
    pub fn any_step_failed(&self) -> bool {
        self.step_status.read().values().any(|s| *s == StepStatus::Failed)
    }

    // -- interpolation ------------------------------------------------------------

    /// Resolves a single `${...}` or `$NAME` reference against current state.
    /// Returns `None` if the reference cannot be resolved.
    fn resolve_reference(&self, reference: &str, env: &HashMap<String, String>) -> Option<String> {
        if let Some(rest) = reference.strip_prefix("workflow.") {
            return self.workflow_variables.read().get(rest).cloned();
        }
        if let Some(rest) = reference.strip_prefix("resources.") {
            let (resource, key) = rest.split_once('.')?;
            return self
                .resource_outputs
                .read()
                .get(resource)
                .and_then(|m| m.get(key))
                .cloned();
        }
        if let Some((step, key)) = reference.split_once('.') {
            if let Some(value) = self.step_outputs.read().get(step).and_then(|m| m.get(key)) {
                return Some(value.clone());
            }
        }
        // Bare token ($NAME form, or a dotted form that didn't resolve as a step
        // output) falls through to merged environment lookup.
        if let Some(value) = env.get(reference) {
            return Some(value.clone());
        }
        self.environment.read().get(reference).cloned().or_else(|| std::env::var(reference).ok())
    }

    /// Replaces every `${...}`/`$NAME` occurrence in `s`. Unresolved references
    /// are left literal so callers (validators) can detect them.
    pub fn interpolate(&self, s: &str, env: &HashMap<String, String>) -> String {
        reference_pattern()
            .replace_all(s, |caps: &regex::Captures| {
                let reference = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
                match self.resolve_reference(reference, env) {
                    Some(value) => value,
                    None => caps.get(0).unwrap().as_str().to_string(),
                }
            })
            .into_owned()
    }

    /// Recursively interpolates every string leaf of a JSON-like parameter map.
    pub fn interpolate_params(
        &self,
        params: &HashMap<String, Value>,
        env: &HashMap<String, String>,
    ) -> HashMap<String, Value> {
        params
            .iter()
            .map(|(k, v)| (k.clone(), self.interpolate_value(v, env)))
            .collect()
    }

    fn interpolate_value(&self, value: &Value, env: &HashMap<String, String>) -> Value {
        match value {
            Value::String(s) => Value::String(self.interpolate(s, env)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.interpolate_value(v, env)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.interpolate_value(v, env)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Extracts every reference in `text` and fails if any cannot be resolved
    /// against current context state.
    pub fn validate_variable_references(&self, text: &str, env: &HashMap<String, String>) -> Result<()> {
        for caps in reference_pattern().captures_iter(text) {
            let reference = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
            if self.resolve_reference(reference, env).is_none() {
                return Err(OrchestratorError::UnresolvedVariable {
                    step: String::new(),
                    reference: caps.get(0).unwrap().as_str().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_workflow_resource_and_build_vars() {
        let ctx = ExecutionContext::new(HashMap::new());
        ctx.set_variable("APP", "myapp");
        ctx.set_resource_output("db", "host", "db.example.com");
        ctx.set_resource_output("db", "port", "5432");
        ctx.set_step_outputs("build", HashMap::from([("version".to_string(), "2.5.0".to_string())]));

        let input = "postgresql://${resources.db.host}:${resources.db.port}/${workflow.APP}?v=${build.version}";
        let result = ctx.interpolate(input, &HashMap::new());
        assert_eq!(result, "postgresql://db.example.com:5432/myapp?v=2.5.0");
    }

    #[test]
    fn leaves_unresolved_references_literal() {
        let ctx = ExecutionContext::new(HashMap::new());
        let result = ctx.interpolate("${workflow.MISSING}", &HashMap::new());
        assert_eq!(result, "${workflow.MISSING}");
    }

    #[test]
    fn validate_fails_on_unresolved_reference() {
        let ctx = ExecutionContext::new(HashMap::new());
        let err = ctx
            .validate_variable_references("${workflow.MISSING}", &HashMap::new())
            .unwrap_err();
        match err {
            OrchestratorError::UnresolvedVariable { reference, .. } => {
                assert_eq!(reference, "${workflow.MISSING}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn env_and_dollar_form_resolve() {
        let env = HashMap::from([("REGION".to_string(), "us-east-1".to_string())]);
        let ctx = ExecutionContext::new(HashMap::new());
        assert_eq!(ctx.interpolate("${REGION}", &env), "us-east-1");
        assert_eq!(ctx.interpolate("$REGION", &env), "us-east-1");
    }

    #[test]
    fn interpolation_is_idempotent() {
        let ctx = ExecutionContext::new(HashMap::new());
        ctx.set_variable("APP", "myapp");
        let input = "name-${workflow.APP}-${workflow.MISSING}";
        let env = HashMap::new();
        let once = ctx.interpolate(input, &env);
        let twice = ctx.interpolate(&once, &env);
        assert_eq!(once, twice);
    }

    #[test]
    fn interpolate_params_recurses_into_nested_structures() {
        let ctx = ExecutionContext::new(HashMap::new());
        ctx.set_variable("ENV", "staging");
        let mut params = HashMap::new();
        params.insert(
            "nested".to_string(),
            serde_json::json!({"name": "${workflow.ENV}", "count": 3, "tags": ["${workflow.ENV}", "x"]}),
        );
        let result = ctx.interpolate_params(&params, &HashMap::new());
        let nested = &result["nested"];
        assert_eq!(nested["name"], "staging");
        assert_eq!(nested["count"], 3);
        assert_eq!(nested["tags"][0], "staging");
    }
}
