//! # CRD Generator
//!
//! Generates the `ClusterExternalSecret` CustomResourceDefinition YAML from
//! the Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/clusterexternalsecret.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! The `ExternalSecret` CRD is owned by the external-secrets project and is
//! not generated here.

use cluster_external_secret_controller::crd::ClusterExternalSecret;
use kube::core::CustomResourceExt;

fn main() {
    let crd = ClusterExternalSecret::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("# Change the types in src/crd/ and regenerate instead");
            println!("#");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
