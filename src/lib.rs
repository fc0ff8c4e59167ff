//! govgraph - governance hierarchy to provisioning graph compiler
//!
//! Reads a resource requirements document and a domain hierarchy document
//! and compiles them into one dependency graph of declarative resources:
//! the domain, its units and projects, the permission grants between them,
//! environments, and a ten-step data lineage bundle per project entity.
//!
//! ## Call Chain
//!
//! Documents -> `config` -> `stack::synthesize` -> `ResourceGraph`
//! -> `build_provisioning_plan` -> `ProvisioningBackend`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use govgraph::config::{load_hierarchy, load_requirements, TemplateVars};
//!
//! let vars = TemplateVars::new(None, Some("us-west-2".to_string()));
//! let requirements = load_requirements("config/datazone_basic_requirements.yaml", &vars)?;
//! let hierarchy = load_hierarchy("config/domain_hierarchy.yaml", &vars)?;
//! let output = govgraph::synthesize(&requirements, &hierarchy)?;
//! println!("{}", output.describe());
//! # Ok::<(), govgraph::ProvisionError>(())
//! ```

// Core error handling
pub mod error;

// Non-fatal condition log
pub mod diagnostics;

// Document loading and templating
pub mod config;

// Dependency graph, tokens, planning and template output
pub mod graph;

// Resource-shape factories
pub mod resources;

// Permission grants (issuer side and endpoint side)
pub mod grants;

// Composite builders
pub mod factory;
pub mod hierarchy;
pub mod lineage;

// Orchestration and output
pub mod backend;
pub mod stack;

pub use backend::{ApplyReport, ProvisioningBackend, TemplateBackend};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Synthesis};
pub use error::{ConfigError, CycleError, GraphError, ProvisionError};
pub use graph::{build_provisioning_plan, NodeId, ProvisioningPlan, ResourceGraph, Token};
pub use stack::{synthesize, synthesize_with_clock, ProvisioningOutput};

// Shared DTOs
pub use govgraph_types;
