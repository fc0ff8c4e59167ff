//! Provisioning backends
//!
//! A backend takes a finished [`ProvisioningOutput`] and makes it real.
//! The only backend shipped here serializes the template to disk; a backend
//! that talks to a deployment service implements the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::stack::ProvisioningOutput;

/// What a backend did with an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub resources: usize,
    pub phases: usize,
    pub location: Option<PathBuf>,
}

#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    async fn apply(&self, output: &ProvisioningOutput) -> Result<ApplyReport>;
}

/// Writes the serialized template to a file
#[derive(Debug, Clone)]
pub struct TemplateBackend {
    path: PathBuf,
}

impl TemplateBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProvisioningBackend for TemplateBackend {
    async fn apply(&self, output: &ProvisioningOutput) -> Result<ApplyReport> {
        let json = output.template().to_json_pretty()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;

        info!(
            path = %self.path.display(),
            resources = output.graph().len(),
            "Wrote provisioning template"
        );
        Ok(ApplyReport {
            resources: output.graph().len(),
            phases: output.plan.phases.len(),
            location: Some(self.path.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_hierarchy, parse_requirements, TemplateVars};
    use crate::grants::FixedClock;
    use crate::graph::template_logical_id;
    use crate::stack::synthesize_with_clock;

    const REQUIREMENTS: &str = r#"
resources:
  iam_roles:
    ExecRole:
      purpose: domain_execution
      trust_actions: ["sts:AssumeRole"]
  datazone_domains:
    Corp:
      domainExecutionRole: ExecRole
"#;

    #[tokio::test]
    async fn test_template_backend_writes_resources() {
        let vars = TemplateVars::default();
        let requirements = parse_requirements(REQUIREMENTS, &vars).unwrap();
        let hierarchy = parse_hierarchy("domainUnits:\n  - name: Sales\n", &vars).unwrap();
        let output = synthesize_with_clock(&requirements, &hierarchy, FixedClock(7)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let backend = TemplateBackend::new(dir.path().join("out").join("template.json"));
        let report = backend.apply(&output).await.unwrap();

        assert_eq!(report.resources, output.graph().len());
        let written = std::fs::read_to_string(backend.path()).unwrap();
        let template: serde_json::Value = serde_json::from_str(&written).unwrap();
        let resources = &template["Resources"];
        let domain_id = template_logical_id("DataZoneDomain-Corp");
        let unit_id = template_logical_id("DataZoneDomainUnit-Sales");
        assert!(resources[domain_id.as_str()].is_object());
        assert_eq!(
            resources[unit_id.as_str()]["Metadata"]["Path"],
            "DataZoneDomainUnit-Sales"
        );
        assert_eq!(
            template["Metadata"]["ProvisioningOrder"]
                .as_array()
                .map(|o| o.len()),
            Some(output.graph().len())
        );
    }
}
