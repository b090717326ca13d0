//! Reconciliation logic for NewResource objects.
//!
//! One pass per dispatched identity: fetch the object, mark it ready, write
//! the status back. Deletion between enqueue and processing is silent
//! success; every other store failure propagates so the dispatch runtime can
//! requeue.

use crate::error::ControllerError;
use crate::store::{NewResourceStore, ResourceId};
use crds::NewResourceStatus;
use tracing::{debug, info};

/// Reconciles NewResource objects through an injected store.
pub struct Reconciler<S> {
    store: S,
}

impl<S> std::fmt::Debug for Reconciler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl<S: NewResourceStore> Reconciler<S> {
    /// Creates a new reconciler instance.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Reconciles one object identity.
    ///
    /// Exactly one read and at most one write against the store. No internal
    /// retries; the caller owns requeue and backoff.
    pub async fn reconcile(&self, id: &ResourceId) -> Result<(), ControllerError> {
        let Some(mut resource) = self.store.get(id).await? else {
            // Deleted between enqueue and processing; the expected terminal
            // state, not an error.
            debug!("NewResource {} is gone, nothing to do", id);
            return Ok(());
        };

        info!("Reconciling NewResource {}", id);

        // The write is issued even when the object is already ready. The
        // pass is idempotent in effect, but the status update is always
        // attempted.
        resource.status = Some(NewResourceStatus { ready: true });
        self.store.update_status(id, &resource).await?;

        Ok(())
    }
}
