//! Turning policy decisions into cluster side effects
//!
//! - Resolving a raw target index against the live node list
//! - Dispatching evictions and node label patches
//! - Measuring the realized power delta after the cluster settles

mod executor;
mod resolver;

pub use executor::{ActionExecutor, ExecutionOutcome, TUNE_LABEL_KEY, TUNE_LABEL_VALUE};
pub use resolver::resolve;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Cluster mutations the executor may request
///
/// Implementations should tolerate repeats: re-patching a label or evicting
/// an already-gone pod must be harmless.
#[async_trait]
pub trait MutationExecutor: Send + Sync {
    /// Request eviction of a pod
    async fn evict_pod(&self, name: &str, namespace: &str) -> Result<()>;

    /// Set a label on a node
    async fn patch_node_label(&self, node: &str, key: &str, value: &str) -> Result<()>;
}

/// Logs mutations instead of applying them
#[derive(Debug, Clone, Default)]
pub struct DryRunMutationExecutor;

#[async_trait]
impl MutationExecutor for DryRunMutationExecutor {
    async fn evict_pod(&self, name: &str, namespace: &str) -> Result<()> {
        info!(pod = %name, namespace = %namespace, "[dry-run] would evict pod");
        Ok(())
    }

    async fn patch_node_label(&self, node: &str, key: &str, value: &str) -> Result<()> {
        info!(node = %node, key = %key, value = %value, "[dry-run] would label node");
        Ok(())
    }
}
