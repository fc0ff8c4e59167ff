//! Error handling for provisioning graph synthesis
//!
//! Fatal conditions only. Non-fatal conditions (missing prerequisites,
//! unresolvable members) are recorded as diagnostics instead, see
//! [`crate::diagnostics`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while mutating the dependency graph
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Duplicate logical id '{0}'")]
    DuplicateLogicalId(String),

    #[error("Unknown node {0}")]
    UnknownNode(usize),

    #[error("Unknown logical id '{0}'")]
    UnknownLogicalId(String),

    #[error("Node '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("Properties of '{logical_id}' could not be serialized: {source}")]
    Properties {
        logical_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Error when a cycle is detected in the dependency graph
#[derive(Error, Debug)]
#[error("{explanation}")]
pub struct CycleError {
    /// Logical ids of the nodes left with unmet prerequisites
    pub nodes: Vec<String>,
    /// Human-readable explanation
    pub explanation: String,
}

/// Configuration document loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {document} document: {source}")]
    Yaml {
        document: &'static str,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level error for a provisioning run. Any of these aborts the run.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("Grant endpoint cannot be resolved: {0}")]
    EndpointUnresolved(String),

    #[error("Failed to create domain unit '{unit}': {source}")]
    UnitCreation {
        unit: String,
        #[source]
        source: Box<ProvisionError>,
    },

    #[error("Unsupported event target {service}/{action} on rule '{rule}'")]
    UnsupportedEventTarget {
        rule: String,
        service: String,
        action: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProvisionError {
    /// Name of the organizational unit whose creation failed, if any.
    pub fn failed_unit(&self) -> Option<&str> {
        match self {
            ProvisionError::UnitCreation { unit, .. } => Some(unit),
            _ => None,
        }
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
