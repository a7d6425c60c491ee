//! Aligning free-form feature maps with a model's schema

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Feature name to value, in any order and with any subset of names
pub type PredictionRequest = HashMap<String, f64>;

/// What to do when a request lacks schema features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilePolicy {
    /// Missing features become 0.0
    #[default]
    Permissive,
    /// Missing features are an error
    Strict,
}

/// A schema-ordered row plus what had to be changed to build it
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub values: Vec<f64>,
    /// Schema features absent from the request, zero-filled
    pub filled: Vec<String>,
    /// Request features the schema does not know, sorted
    pub ignored: Vec<String>,
}

/// Build the row a model expects: schema order, unknown names dropped,
/// missing names zero-filled.
pub fn reconcile(request: &PredictionRequest, schema: &[String]) -> Vec<f64> {
    schema
        .iter()
        .map(|name| request.get(name).copied().unwrap_or(0.0))
        .collect()
}

/// [`reconcile`], also reporting which names were filled or ignored
pub fn reconcile_with_report(request: &PredictionRequest, schema: &[String]) -> Reconciliation {
    let mut filled = Vec::new();
    let values = schema
        .iter()
        .map(|name| match request.get(name) {
            Some(v) => *v,
            None => {
                filled.push(name.clone());
                0.0
            }
        })
        .collect();

    let mut ignored: Vec<String> = request
        .keys()
        .filter(|k| !schema.contains(k))
        .cloned()
        .collect();
    ignored.sort();

    if !filled.is_empty() || !ignored.is_empty() {
        debug!(filled = ?filled, ignored = ?ignored, "Reconciled prediction request");
    }

    Reconciliation {
        values,
        filled,
        ignored,
    }
}

/// Reconciles requests against one frozen schema
#[derive(Debug, Clone)]
pub struct PredictionAdapter {
    schema: Vec<String>,
    policy: ReconcilePolicy,
}

impl PredictionAdapter {
    pub fn new(schema: Vec<String>) -> Self {
        Self {
            schema,
            policy: ReconcilePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    pub fn adapt(&self, request: &PredictionRequest) -> Result<Reconciliation> {
        let report = reconcile_with_report(request, &self.schema);
        if self.policy == ReconcilePolicy::Strict && !report.filled.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "request is missing features: {}",
                report.filled.join(", ")
            )));
        }
        Ok(report)
    }
}
