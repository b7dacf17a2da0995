//! Cluster mutations through the Kubernetes API

use crate::actions::MutationExecutor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, EvictParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;

/// Applies evictions and node label patches against the API server
#[derive(Clone)]
pub struct KubeMutationExecutor {
    client: Client,
}

impl KubeMutationExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// JSON merge patch setting one node label
pub(crate) fn label_patch(key: &str, value: &str) -> serde_json::Value {
    json!({
        "metadata": {
            "labels": { key: value }
        }
    })
}

#[async_trait]
impl MutationExecutor for KubeMutationExecutor {
    async fn evict_pod(&self, name: &str, namespace: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.evict(name, &EvictParams::default())
            .await
            .with_context(|| format!("Failed to evict pod {}/{}", namespace, name))?;
        Ok(())
    }

    async fn patch_node_label(&self, node: &str, key: &str, value: &str) -> Result<()> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes
            .patch(node, &PatchParams::default(), &Patch::Merge(label_patch(key, value)))
            .await
            .with_context(|| format!("Failed to label node {}", node))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_patch_shape() {
        let patch = label_patch("optimiser/tune", "cpusave");
        assert_eq!(patch["metadata"]["labels"]["optimiser/tune"], "cpusave");
        assert_eq!(patch.as_object().unwrap().len(), 1);
    }
}
