//! # Namespace Selection
//!
//! Converts a ClusterExternalSecret's `namespaceSelector` into a kube-rs
//! [`Selector`] and evaluates it against namespaces.

use crate::controller::reconciler::types::ReconcileError;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::core::{Selector, SelectorExt};
use kube::ResourceExt;
use regex::Regex;
use std::collections::BTreeMap;

const MAX_LABEL_NAME_LENGTH: usize = 63;
const MAX_LABEL_PREFIX_LENGTH: usize = 253;

/// Convert a `LabelSelector` into a `Selector`
///
/// `In`/`NotIn` need at least one value and `Exists`/`DoesNotExist` must not
/// carry any, mirroring apiserver validation. Label keys and values must be
/// syntactically valid. An empty selector selects every namespace.
pub fn label_selector_as_selector(selector: &LabelSelector) -> Result<Selector, ReconcileError> {
    let syntax = LabelSyntax::new()?;

    for (key, value) in selector.match_labels.iter().flatten() {
        syntax.validate_key(key)?;
        syntax.validate_value(key, value)?;
    }
    for requirement in selector.match_expressions.iter().flatten() {
        validate_requirement(requirement)?;
        syntax.validate_key(&requirement.key)?;
        for value in requirement.values.iter().flatten() {
            syntax.validate_value(&requirement.key, value)?;
        }
    }

    Selector::try_from(selector.clone())
        .map_err(|e| ReconcileError::InvalidSelector(e.to_string()))
}

/// Kubernetes label key and value grammar
struct LabelSyntax {
    name: Regex,
    prefix: Regex,
}

impl LabelSyntax {
    fn new() -> Result<Self, ReconcileError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                ReconcileError::InvalidSelector(format!("failed to compile label regex: {e}"))
            })
        };
        Ok(Self {
            name: compile(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$")?,
            prefix: compile(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")?,
        })
    }

    // `prefix/name` or `name`
    fn validate_key(&self, key: &str) -> Result<(), ReconcileError> {
        let (prefix, name) = match key.split_once('/') {
            Some((prefix, name)) => (Some(prefix), name),
            None => (None, key),
        };

        let prefix_ok = prefix.is_none_or(|p| {
            p.len() <= MAX_LABEL_PREFIX_LENGTH && self.prefix.is_match(p)
        });
        let name_ok = name.len() <= MAX_LABEL_NAME_LENGTH && self.name.is_match(name);

        if prefix_ok && name_ok {
            Ok(())
        } else {
            Err(ReconcileError::InvalidSelector(format!(
                "'{key}' is not a valid label key"
            )))
        }
    }

    // Empty values are allowed
    fn validate_value(&self, key: &str, value: &str) -> Result<(), ReconcileError> {
        if value.is_empty()
            || (value.len() <= MAX_LABEL_NAME_LENGTH && self.name.is_match(value))
        {
            Ok(())
        } else {
            Err(ReconcileError::InvalidSelector(format!(
                "'{value}' is not a valid label value for key '{key}'"
            )))
        }
    }
}

fn validate_requirement(requirement: &LabelSelectorRequirement) -> Result<(), ReconcileError> {
    let value_count = requirement.values.as_ref().map_or(0, Vec::len);
    match requirement.operator.as_str() {
        "In" | "NotIn" if value_count == 0 => Err(ReconcileError::InvalidSelector(format!(
            "values must be non-empty for operator {} on key '{}'",
            requirement.operator, requirement.key
        ))),
        "Exists" | "DoesNotExist" if value_count > 0 => {
            Err(ReconcileError::InvalidSelector(format!(
                "values must be empty for operator {} on key '{}'",
                requirement.operator, requirement.key
            )))
        }
        "In" | "NotIn" | "Exists" | "DoesNotExist" => Ok(()),
        other => Err(ReconcileError::InvalidSelector(format!(
            "'{other}' is not a valid label selector operator"
        ))),
    }
}

/// Whether a label set satisfies the selector
#[must_use]
pub fn matches_labels(selector: &Selector, labels: &BTreeMap<String, String>) -> bool {
    selector.matches(labels)
}

/// Whether a namespace's labels satisfy the selector
#[must_use]
pub fn matches_namespace(selector: &Selector, namespace: &Namespace) -> bool {
    matches_labels(selector, namespace.labels())
}

/// Keep only the namespaces the selector matches
#[must_use]
pub fn select_namespaces(selector: &Selector, namespaces: Vec<Namespace>) -> Vec<Namespace> {
    namespaces
        .into_iter()
        .filter(|ns| matches_namespace(selector, ns))
        .collect()
}
