//! Prints the KataConfig CustomResourceDefinition as YAML.
//!
//! The machine configuration kinds are owned by the platform and are not
//! emitted here.

use crds::KataConfig;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&KataConfig::crd())?);
    Ok(())
}
