//! Object store access for the reconciler.
//!
//! The reconciler talks to the cluster through the `NewResourceStore` trait
//! rather than a concrete client, so unit tests can substitute an in-memory
//! mock. The production implementation wraps `kube::Api<NewResource>`.

use async_trait::async_trait;
use crds::NewResource;
use kube::api::PostParams;
use kube::{Api, Client};
use std::fmt;

/// Identity of one NewResource object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Store operations the reconciler depends on.
///
/// All async methods must be `Send` to work with Tokio's work-stealing
/// runtime.
#[async_trait]
pub trait NewResourceStore: Send + Sync {
    /// Fetches an object by identity. Not-found is `Ok(None)`, every other
    /// failure is an error.
    async fn get(&self, id: &ResourceId) -> Result<Option<NewResource>, kube::Error>;

    /// Replaces the object's status subresource. A conflicting concurrent
    /// write surfaces as an API error from the server's optimistic
    /// concurrency check.
    async fn update_status(
        &self,
        id: &ResourceId,
        resource: &NewResource,
    ) -> Result<NewResource, kube::Error>;
}

/// Production store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<NewResource> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl NewResourceStore for KubeStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<NewResource>, kube::Error> {
        self.api(&id.namespace).get_opt(&id.name).await
    }

    async fn update_status(
        &self,
        id: &ResourceId,
        resource: &NewResource,
    ) -> Result<NewResource, kube::Error> {
        let data = serde_json::to_vec(resource).map_err(kube::Error::SerdeError)?;
        self.api(&id.namespace)
            .replace_status(&id.name, &PostParams::default(), data)
            .await
    }
}
