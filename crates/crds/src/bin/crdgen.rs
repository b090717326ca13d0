//! Prints the NewResource CRD manifest as YAML (for `kubectl apply -f -`).

use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&crds::NewResource::crd())?);
    Ok(())
}
