// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Workflow resolver: merges platform, product, and application-derived
//! workflow tiers into a phased execution plan (§4.4).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dag;
use crate::error::{OrchestratorError, Result};
use crate::persistence::PersistenceRef;
use crate::workflow::{Phase, ResolvedWorkflow, Step, Tier, Trigger, Workflow, WorkflowFile};

/// The application spec driving application-tier workflow generation.
#[derive(Debug, Clone)]
pub struct ApplicationInstance {
    pub name: String,
    pub configuration: HashMap<String, serde_json::Value>,
    /// Names of resources declared in the application spec, e.g. `["db", "cache"]`.
    pub resources: Vec<String>,
}

impl ApplicationInstance {
    /// Product derivation per §4.4 step 2: `configuration.metadata.product`,
    /// else the first `-`-separated segment of the name, else `"default"`.
    pub fn product(&self) -> String {
        if let Some(product) = self
            .configuration
            .get("metadata")
            .and_then(|m| m.get("product"))
            .and_then(|p| p.as_str())
        {
            return product.to_string();
        }
        if let Some((first, _)) = self.name.split_once('-') {
            if !first.is_empty() {
                return first.to_string();
            }
        }
        "default".to_string()
    }
}

/// Resolves the three workflow tiers for one application into a
/// phase-grouped execution plan.
pub struct WorkflowResolver {
    root: PathBuf,
    persistence: PersistenceRef,
    required_platform_workflows: Vec<String>,
}

impl WorkflowResolver {
    pub fn new(root: impl Into<PathBuf>, persistence: PersistenceRef, required_platform_workflows: Vec<String>) -> Self {
        Self {
            root: root.into(),
            persistence,
            required_platform_workflows,
        }
    }

    pub async fn resolve(&self, app: &ApplicationInstance) -> Result<HashMap<Phase, Vec<ResolvedWorkflow>>> {
        let platform = load_tier_dir(&self.root.join("platform"), Tier::Platform)?;
        let product_dir = self.root.join("products").join(app.product());
        let product = load_tier_dir(&product_dir, Tier::Product)?;
        let application = vec![self.generate_application_workflow(app)];

        let mut by_phase: HashMap<Phase, Vec<ResolvedWorkflow>> = HashMap::new();
        for phase in Phase::ALL {
            by_phase.insert(phase, Vec::new());
        }

        for (resolved, spec_triggers) in platform.into_iter().chain(product).chain(application) {
            dag::validate_acyclic(&resolved.workflow.steps)?;
            if !self.fires(app, &resolved.workflow.name, &spec_triggers).await? {
                continue;
            }
            by_phase.entry(resolved.phase).or_default().push(resolved);
        }

        self.validate_required_platform_workflows(&by_phase)?;
        Ok(by_phase)
    }

    async fn fires(&self, app: &ApplicationInstance, workflow_name: &str, triggers: &[Trigger]) -> Result<bool> {
        if triggers.is_empty() {
            return Ok(true);
        }
        for trigger in triggers {
            let fires = match trigger {
                Trigger::AllDeployments => true,
                Trigger::ProductDeployment => true,
                Trigger::Manual => false,
                Trigger::FirstDeployment => {
                    !self
                        .persistence
                        .has_prior_successful_execution(&app.name, workflow_name)
                        .await?
                }
            };
            if fires {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn generate_application_workflow(&self, app: &ApplicationInstance) -> (ResolvedWorkflow, Vec<Trigger>) {
        let mut steps: Vec<Step> = app
            .resources
            .iter()
            .map(|resource| {
                let mut step = Step::new(format!("provision-{resource}"), "resource-provisioning");
                step.resource = Some(resource.clone());
                step
            })
            .collect();

        let mut deploy = Step::new("deploy-application", "kubernetes");
        deploy.config.insert(
            "namespace".to_string(),
            serde_json::Value::String(app.name.to_lowercase()),
        );
        deploy.depends_on = steps.iter().map(|s| s.name.clone()).collect();
        steps.push(deploy);

        let workflow = Workflow {
            name: format!("{}-deploy", app.name),
            variables: HashMap::new(),
            steps,
        };
        (
            ResolvedWorkflow::new(workflow, Phase::Deployment, Tier::Application),
            vec![Trigger::AllDeployments],
        )
    }

    fn validate_required_platform_workflows(&self, by_phase: &HashMap<Phase, Vec<ResolvedWorkflow>>) -> Result<()> {
        let platform_names: std::collections::HashSet<&str> = by_phase
            .values()
            .flatten()
            .filter(|rw| rw.sources.values().any(|tiers| tiers.contains(&Tier::Platform)))
            .map(|rw| rw.workflow.name.as_str())
            .collect();

        for required in &self.required_platform_workflows {
            if !platform_names.contains(required.as_str()) {
                return Err(OrchestratorError::MissingRequiredWorkflow {
                    name: required.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Reads every `*.yml`/`*.yaml` file in `dir` as a `WorkflowFile`, tagging
/// the resulting `ResolvedWorkflow` with `tier`. A missing directory yields
/// no workflows rather than an error (an application may have no
/// product-tier overrides, for instance).
fn load_tier_dir(dir: &Path, tier: Tier) -> Result<Vec<(ResolvedWorkflow, Vec<Trigger>)>> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => {
            return Err(OrchestratorError::WorkflowLoad {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|e| OrchestratorError::WorkflowLoad {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| OrchestratorError::WorkflowLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file: WorkflowFile = serde_yaml::from_str(&contents).map_err(|e| OrchestratorError::WorkflowLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let phase = file.metadata.phase;
        let triggers = file.spec.triggers.clone();
        let workflow = file.into_workflow();
        workflow.validate()?;
        out.push((ResolvedWorkflow::new(workflow, phase, tier), triggers));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use std::sync::Arc;

    fn write_workflow(dir: &Path, file_name: &str, yaml: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(file_name), yaml).unwrap();
    }

    fn app(name: &str, resources: &[&str]) -> ApplicationInstance {
        ApplicationInstance {
            name: name.to_string(),
            configuration: HashMap::new(),
            resources: resources.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn generates_application_workflow_with_resource_steps() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence: PersistenceRef = Arc::new(InMemoryPersistence::new());
        let resolver = WorkflowResolver::new(tmp.path(), persistence, vec![]);

        let plan = resolver.resolve(&app("checkout", &["db", "cache"])).await.unwrap();
        let deployment = &plan[&Phase::Deployment];
        assert_eq!(deployment.len(), 1);
        let generated = &deployment[0].workflow;
        assert_eq!(generated.steps.len(), 3);
        assert_eq!(generated.steps[2].name, "deploy-application");
        assert_eq!(generated.steps[2].depends_on, vec!["provision-db", "provision-cache"]);
    }

    #[tokio::test]
    async fn loads_platform_and_product_tiers() {
        let tmp = tempfile::tempdir().unwrap();
        write_workflow(
            &tmp.path().join("platform"),
            "security.yml",
            r#"
apiVersion: v1
kind: PlatformWorkflow
metadata:
  name: security-scan
  phase: pre-deployment
spec:
  triggers: [all_deployments]
  steps:
    - name: scan
      type: policy
"#,
        );
        write_workflow(
            &tmp.path().join("products").join("checkout"),
            "smoke.yml",
            r#"
apiVersion: v1
kind: ProductWorkflow
metadata:
  name: smoke-test
  phase: post-deployment
  product: checkout
spec:
  triggers: [product_deployment]
  steps:
    - name: smoke
      type: validation
"#,
        );

        let persistence: PersistenceRef = Arc::new(InMemoryPersistence::new());
        let resolver = WorkflowResolver::new(tmp.path(), persistence, vec!["security-scan".to_string()]);
        let plan = resolver.resolve(&app("checkout-api", &[])).await.unwrap();

        assert_eq!(plan[&Phase::PreDeployment].len(), 1);
        assert_eq!(plan[&Phase::PreDeployment][0].workflow.name, "security-scan");
        assert_eq!(plan[&Phase::PostDeployment].len(), 1);
        assert_eq!(plan[&Phase::PostDeployment][0].workflow.name, "smoke-test");
    }

    #[tokio::test]
    async fn missing_required_platform_workflow_fails_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence: PersistenceRef = Arc::new(InMemoryPersistence::new());
        let resolver = WorkflowResolver::new(tmp.path(), persistence, vec!["security-scan".to_string()]);

        let result = resolver.resolve(&app("checkout", &[])).await;
        assert!(matches!(result, Err(OrchestratorError::MissingRequiredWorkflow { .. })));
    }

    #[tokio::test]
    async fn manual_trigger_never_fires() {
        let tmp = tempfile::tempdir().unwrap();
        write_workflow(
            &tmp.path().join("platform"),
            "manual.yml",
            r#"
apiVersion: v1
kind: PlatformWorkflow
metadata:
  name: manual-only
  phase: pre-deployment
spec:
  triggers: [manual]
  steps:
    - name: step1
      type: policy
"#,
        );
        let persistence: PersistenceRef = Arc::new(InMemoryPersistence::new());
        let resolver = WorkflowResolver::new(tmp.path(), persistence, vec![]);
        let plan = resolver.resolve(&app("checkout", &[])).await.unwrap();
        assert!(plan[&Phase::PreDeployment].is_empty());
    }

    #[tokio::test]
    async fn product_derivation_prefers_explicit_metadata() {
        let mut config = HashMap::new();
        config.insert(
            "metadata".to_string(),
            serde_json::json!({ "product": "payments" }),
        );
        let instance = ApplicationInstance {
            name: "checkout-api".to_string(),
            configuration: config,
            resources: vec![],
        };
        assert_eq!(instance.product(), "payments");
    }

    #[test]
    fn product_derivation_falls_back_to_name_segment() {
        let instance = app("checkout-api", &[]);
        assert_eq!(instance.product(), "checkout");
    }

    #[test]
    fn product_derivation_falls_back_to_default() {
        let instance = app("checkoutapi", &[]);
        assert_eq!(instance.product(), "default");
    }

    #[tokio::test]
    async fn resolve_rejects_a_cyclic_platform_workflow() {
        let tmp = tempfile::tempdir().unwrap();
        write_workflow(
            &tmp.path().join("platform"),
            "cyclic.yml",
            r#"
apiVersion: v1
kind: PlatformWorkflow
metadata:
  name: cyclic
  phase: pre-deployment
spec:
  triggers: [all_deployments]
  steps:
    - name: a
      type: policy
      depends_on: [b]
    - name: b
      type: policy
      depends_on: [a]
"#,
        );
        let persistence: PersistenceRef = Arc::new(InMemoryPersistence::new());
        let resolver = WorkflowResolver::new(tmp.path(), persistence, vec![]);
        let result = resolver.resolve(&app("checkout", &[])).await;
        assert!(matches!(result, Err(OrchestratorError::DependencyCycle { .. })));
    }
}
