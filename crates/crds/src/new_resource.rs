//! NewResource CRD
//!
//! The single custom resource managed by the operator. Authors set
//! `spec.foo`; the controller derives `status.ready` and writes it back
//! through the status subresource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.newresource.com",
    version = "v1alpha1",
    kind = "NewResource",
    namespaced,
    status = "NewResourceStatus",
    shortname = "newres"
)]
#[serde(rename_all = "camelCase")]
pub struct NewResourceSpec {
    /// Author-provided value; read-only for the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewResourceStatus {
    /// True once the object has been observed and processed
    #[serde(default)]
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn spec_foo_round_trips() {
        let spec = NewResourceSpec {
            foo: Some("bar".to_string()),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({"foo": "bar"}));

        let back: NewResourceSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back.foo.as_deref(), Some("bar"));
    }

    #[test]
    fn absent_foo_stays_absent() {
        let spec: NewResourceSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(spec.foo.is_none());

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn status_ready_round_trips() {
        let status = NewResourceStatus { ready: true };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, serde_json::json!({"ready": true}));

        let back: NewResourceStatus = serde_json::from_value(json).unwrap();
        assert!(back.ready);

        // An absent ready field defaults to false
        let empty: NewResourceStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!empty.ready);
    }

    #[test]
    fn manifest_round_trips() {
        let manifest = serde_json::json!({
            "apiVersion": "apps.newresource.com/v1alpha1",
            "kind": "NewResource",
            "metadata": {"name": "x", "namespace": "default"},
            "spec": {"foo": "bar"},
            "status": {"ready": false}
        });
        let resource: NewResource = serde_json::from_value(manifest.clone()).unwrap();
        assert_eq!(resource.spec.foo.as_deref(), Some("bar"));
        assert!(!resource.status.as_ref().unwrap().ready);

        let back = serde_json::to_value(&resource).unwrap();
        assert_eq!(back["spec"]["foo"], "bar");
        assert_eq!(back["status"]["ready"], false);
    }

    #[test]
    fn crd_identity_and_status_subresource() {
        let crd = NewResource::crd();
        assert_eq!(crd.spec.group, "apps.newresource.com");
        assert_eq!(crd.spec.names.kind, "NewResource");
        assert_eq!(crd.spec.names.plural, "newresources");
        assert_eq!(
            crd.spec.names.short_names.as_deref(),
            Some(&["newres".to_string()][..])
        );
        assert_eq!(crd.spec.scope, "Namespaced");

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        let subresources = version.subresources.as_ref().unwrap();
        assert!(subresources.status.is_some());
    }
}
