//! # Membership
//!
//! Works out which previously provisioned namespaces dropped out of the
//! selector since the last cycle.

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use std::collections::HashSet;

/// Namespaces in `provisioned` that are no longer in `matched`
///
/// Order follows `provisioned`; duplicates are reported once.
#[must_use]
pub fn removed_namespaces(matched: &[Namespace], provisioned: &[String]) -> Vec<String> {
    let matched: HashSet<String> = matched.iter().map(ResourceExt::name_any).collect();
    let mut seen = HashSet::new();

    provisioned
        .iter()
        .filter(|ns| !matched.contains(ns.as_str()) && seen.insert(ns.as_str()))
        .cloned()
        .collect()
}
