//! # Cluster Client
//!
//! The Kubernetes API operations the reconciler and the namespace fan-out
//! need, behind a trait so both can run against an in-memory cluster in tests.
//!
//! `KubeClusterClient` is the production implementation on top of kube-rs.

use crate::constants::FIELD_MANAGER;
use crate::crd::{ClusterExternalSecret, ExternalSecret};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::Selector;
use kube::Client;
use tracing::debug;

/// One page of ClusterExternalSecrets from a paginated list
#[derive(Debug, Clone, Default)]
pub struct ParentPage {
    pub items: Vec<ClusterExternalSecret>,
    /// Token for the next page; `None` once the listing is exhausted
    pub continue_token: Option<String>,
}

/// What `create_or_update_external_secret` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOperation {
    Created,
    Updated,
}

impl ChildOperation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildOperation::Created => "created",
            ChildOperation::Updated => "updated",
        }
    }
}

/// Kubernetes API surface used by the controller
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a ClusterExternalSecret, `None` if it does not exist
    async fn get_cluster_external_secret(&self, name: &str)
        -> Result<Option<ClusterExternalSecret>>;

    /// List one page of ClusterExternalSecrets
    ///
    /// # Arguments
    /// * `limit` - Maximum number of items in the page
    /// * `continue_token` - Token returned by the previous page, `None` for the first page
    async fn list_cluster_external_secrets(
        &self,
        limit: u32,
        continue_token: Option<&str>,
    ) -> Result<ParentPage>;

    /// Apply a JSON merge patch to the status subresource
    async fn patch_cluster_external_secret_status(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<()>;

    /// List namespaces matching a label selector
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>>;

    /// Metadata-only fetch of an ExternalSecret, `None` if it does not exist
    async fn get_external_secret_metadata(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ObjectMeta>>;

    /// Create the ExternalSecret, or overwrite the spec of the existing one
    ///
    /// Only the spec of an existing object is replaced; its labels,
    /// annotations and owner references stay as the API server holds them.
    async fn create_or_update_external_secret(
        &self,
        desired: &ExternalSecret,
    ) -> Result<ChildOperation>;

    /// Delete an ExternalSecret
    async fn delete_external_secret(&self, namespace: &str, name: &str) -> Result<()>;
}

/// `ClusterClient` backed by a live kube-rs client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn parents(&self) -> Api<ClusterExternalSecret> {
        Api::all(self.client.clone())
    }

    fn external_secrets(&self, namespace: &str) -> Api<ExternalSecret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_cluster_external_secret(
        &self,
        name: &str,
    ) -> Result<Option<ClusterExternalSecret>> {
        self.parents()
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get ClusterExternalSecret {name}"))
    }

    async fn list_cluster_external_secrets(
        &self,
        limit: u32,
        continue_token: Option<&str>,
    ) -> Result<ParentPage> {
        let mut params = ListParams::default().limit(limit);
        if let Some(token) = continue_token {
            params = params.continue_token(token);
        }

        let list = self
            .parents()
            .list(&params)
            .await
            .context("Failed to list ClusterExternalSecrets")?;

        Ok(ParentPage {
            items: list.items,
            continue_token: list.metadata.continue_.filter(|token| !token.is_empty()),
        })
    }

    async fn patch_cluster_external_secret_status(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        self.parents()
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .with_context(|| format!("Failed to patch status of ClusterExternalSecret {name}"))?;
        Ok(())
    }

    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default().labels_from(selector))
            .await
            .context("Failed to list namespaces")?;
        Ok(list.items)
    }

    async fn get_external_secret_metadata(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ObjectMeta>> {
        let partial = self
            .external_secrets(namespace)
            .get_metadata_opt(name)
            .await
            .with_context(|| format!("Failed to get ExternalSecret {namespace}/{name}"))?;
        Ok(partial.map(|p| p.metadata))
    }

    async fn create_or_update_external_secret(
        &self,
        desired: &ExternalSecret,
    ) -> Result<ChildOperation> {
        let namespace = desired
            .metadata
            .namespace
            .as_deref()
            .context("ExternalSecret has no namespace")?;
        let name = desired
            .metadata
            .name
            .as_deref()
            .context("ExternalSecret has no name")?;
        let api = self.external_secrets(namespace);

        match api
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get ExternalSecret {namespace}/{name}"))?
        {
            None => {
                api.create(&post_params(), desired)
                    .await
                    .with_context(|| format!("Failed to create ExternalSecret {namespace}/{name}"))?;
                Ok(ChildOperation::Created)
            }
            Some(mut existing) => {
                // resourceVersion of the fetched object guards against lost updates
                existing.spec = desired.spec.clone();
                api.replace(name, &post_params(), &existing)
                    .await
                    .with_context(|| format!("Failed to update ExternalSecret {namespace}/{name}"))?;
                debug!("Overwrote spec of ExternalSecret {}/{}", namespace, name);
                Ok(ChildOperation::Updated)
            }
        }
    }

    async fn delete_external_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.external_secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("Failed to delete ExternalSecret {namespace}/{name}"))?;
        Ok(())
    }
}
