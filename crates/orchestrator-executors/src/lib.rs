// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Concrete step executors for the platform orchestration engine: terraform,
//! Kubernetes, Ansible, GitOps, policy checks, and passive integrations.
//! [`register_default_executors`] wires every executor named by the workflow
//! model into a fresh [`StepExecutorRegistry`].

pub mod ansible;
pub mod argocd;
pub mod config_ext;
pub mod error;
pub mod git_commit;
pub mod gitea;
pub mod kubernetes;
pub mod passive;
pub mod policy;
pub mod resource_provisioning;
pub mod subprocess;
pub mod terraform;
pub mod terraform_generate;

pub use ansible::AnsibleExecutor;
pub use argocd::ArgoCdAppExecutor;
pub use error::ExecutorError;
pub use git_commit::GitCommitManifestsExecutor;
pub use gitea::GiteaRepoExecutor;
pub use kubernetes::KubernetesExecutor;
pub use passive::{PassiveExecutor, PASSIVE_STEP_TYPES};
pub use policy::PolicyExecutor;
pub use resource_provisioning::ResourceProvisioningExecutor;
pub use terraform::TerraformExecutor;
pub use terraform_generate::TerraformGenerateExecutor;

use std::sync::Arc;

use orchestrator_core::registry::StepExecutorRegistry;
use orchestrator_core::resource::ResourceManagerRef;

/// Registers every concrete step executor this crate provides into
/// `registry`. Callers that need a non-default `ResourceManager` (e.g. a
/// persistence-backed one) should build [`ResourceProvisioningExecutor`]
/// themselves instead of calling this convenience function.
pub fn register_default_executors(registry: &mut StepExecutorRegistry, resources: ResourceManagerRef) {
    registry.register(Arc::new(TerraformExecutor));
    registry.register(Arc::new(TerraformGenerateExecutor));
    registry.register(Arc::new(KubernetesExecutor));
    registry.register(Arc::new(AnsibleExecutor));
    registry.register(Arc::new(PolicyExecutor));
    registry.register(Arc::new(GitCommitManifestsExecutor));
    registry.register(Arc::new(GiteaRepoExecutor::new()));
    registry.register(Arc::new(ArgoCdAppExecutor::new()));
    registry.register(Arc::new(ResourceProvisioningExecutor::new(resources)));
    for step_type in PASSIVE_STEP_TYPES {
        registry.register(Arc::new(PassiveExecutor::new(*step_type)));
    }
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
