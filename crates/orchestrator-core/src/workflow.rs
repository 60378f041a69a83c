// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Workflow and step data model.
//!
//! These types mirror the on-disk YAML workflow file format (`WorkflowFile`)
//! and the in-memory domain representation consumed by the resolver and
//! executor (`Workflow`, `Step`, `ResolvedWorkflow`).

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deployment phase a workflow runs in. Phases execute strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    PreDeployment,
    Deployment,
    PostDeployment,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::PreDeployment, Phase::Deployment, Phase::PostDeployment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreDeployment => "pre-deployment",
            Phase::Deployment => "deployment",
            Phase::PostDeployment => "post-deployment",
        }
    }
}

/// The tier a workflow definition originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Platform,
    Product,
    Application,
}

/// Trigger conditions that decide whether a workflow participates in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    AllDeployments,
    FirstDeployment,
    ProductDeployment,
    Manual,
}

/// A single step within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,

    #[serde(rename = "type")]
    pub step_type: String,

    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub parallel_group: u32,

    #[serde(default)]
    pub when: Option<String>,

    #[serde(default, rename = "if")]
    pub if_condition: Option<String>,

    #[serde(default)]
    pub unless: Option<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub set_variables: HashMap<String, String>,

    #[serde(default)]
    pub output_file: Option<String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub resource: Option<String>,

    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Step {
    /// Builds a minimal step with no dependencies, conditions, or outputs;
    /// mainly useful for constructing fixtures in tests.
    pub fn new(name: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step_type: step_type.into(),
            config: HashMap::new(),
            depends_on: Vec::new(),
            parallel: false,
            parallel_group: 0,
            when: None,
            if_condition: None,
            unless: None,
            env: HashMap::new(),
            set_variables: HashMap::new(),
            output_file: None,
            outputs: Vec::new(),
            resource: None,
            timeout: None,
        }
    }

    /// Name used to key `resource_outputs`: the step's declared `resource`, else its own name.
    pub fn resource_key(&self) -> &str {
        self.resource.as_deref().unwrap_or(&self.name)
    }
}

/// An ordered sequence of steps plus workflow-local variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,

    #[serde(default)]
    pub variables: HashMap<String, String>,

    pub steps: Vec<Step>,
}

impl Workflow {
    /// Structural validation: unique step names, dependencies name real steps.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(OrchestratorError::InvalidWorkflow {
                    reason: format!("duplicate step name '{}'", step.name),
                });
            }
        }
        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(OrchestratorError::DependencyNotFound {
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// On-disk workflow file format (platform/product tiers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFile {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: WorkflowFileMetadata,
    pub spec: WorkflowFileSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFileMetadata {
    pub name: String,
    pub phase: Phase,
    #[serde(default)]
    pub product: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFileSpec {
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub steps: Vec<Step>,
}

impl WorkflowFile {
    pub fn into_workflow(self) -> Workflow {
        Workflow {
            name: self.metadata.name,
            variables: self.spec.variables,
            steps: self.spec.steps,
        }
    }
}

/// A workflow after tier merging, tagged with the phase it belongs to and
/// which tier(s) contributed each of its steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedWorkflow {
    pub workflow: Workflow,
    pub phase: Phase,
    /// step name -> contributing tier(s)
    pub sources: HashMap<String, Vec<Tier>>,
}

impl ResolvedWorkflow {
    pub fn new(workflow: Workflow, phase: Phase, tier: Tier) -> Self {
        let sources = workflow
            .steps
            .iter()
            .map(|s| (s.name.clone(), vec![tier]))
            .collect();
        Self {
            workflow,
            phase,
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, step_type: &str, depends_on: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            step_type: step_type.to_string(),
            config: HashMap::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            parallel: false,
            parallel_group: 0,
            when: None,
            if_condition: None,
            unless: None,
            env: HashMap::new(),
            set_variables: HashMap::new(),
            output_file: None,
            outputs: vec![],
            resource: None,
            timeout: None,
        }
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let workflow = Workflow {
            name: "w".to_string(),
            variables: HashMap::new(),
            steps: vec![step("a", "terraform", &[]), step("a", "kubernetes", &[])],
        };
        assert!(matches!(
            workflow.validate(),
            Err(OrchestratorError::InvalidWorkflow { .. })
        ));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let workflow = Workflow {
            name: "w".to_string(),
            variables: HashMap::new(),
            steps: vec![step("a", "terraform", &["ghost"])],
        };
        assert!(matches!(
            workflow.validate(),
            Err(OrchestratorError::DependencyNotFound { .. })
        ));
    }

    #[test]
    fn accepts_well_formed_workflow() {
        let workflow = Workflow {
            name: "w".to_string(),
            variables: HashMap::new(),
            steps: vec![step("a", "terraform", &[]), step("b", "kubernetes", &["a"])],
        };
        assert!(workflow.validate().is_ok());
    }

    #[test]
    fn resource_key_falls_back_to_step_name() {
        let mut s = step("provision-db", "resource-provisioning", &[]);
        assert_eq!(s.resource_key(), "provision-db");
        s.resource = Some("db".to_string());
        assert_eq!(s.resource_key(), "db");
    }
}
