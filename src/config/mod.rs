//! Configuration document loading
//!
//! Both documents go through [`template::render`] and are then parsed with
//! `serde_yaml` into the `govgraph_types` DTOs. Any failure here is fatal
//! and happens before a single resource is declared.

pub mod template;

use std::path::Path;

use govgraph_types::{HierarchyDocument, RequirementsDocument};

use crate::error::ConfigError;

pub use template::{render, TemplateVars};

pub fn parse_requirements(
    content: &str,
    vars: &TemplateVars,
) -> Result<RequirementsDocument, ConfigError> {
    let rendered = render(content, vars);
    serde_yaml::from_str(&rendered).map_err(|source| ConfigError::Yaml {
        document: "requirements",
        source,
    })
}

pub fn parse_hierarchy(
    content: &str,
    vars: &TemplateVars,
) -> Result<HierarchyDocument, ConfigError> {
    let rendered = render(content, vars);
    serde_yaml::from_str(&rendered).map_err(|source| ConfigError::Yaml {
        document: "hierarchy",
        source,
    })
}

pub fn load_requirements(
    path: impl AsRef<Path>,
    vars: &TemplateVars,
) -> Result<RequirementsDocument, ConfigError> {
    let content = read(path.as_ref())?;
    let doc = parse_requirements(&content, vars)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        buckets = doc.resources.s3_buckets.len(),
        roles = doc.resources.iam_roles.len(),
        "Loaded requirements document"
    );
    Ok(doc)
}

pub fn load_hierarchy(
    path: impl AsRef<Path>,
    vars: &TemplateVars,
) -> Result<HierarchyDocument, ConfigError> {
    let content = read(path.as_ref())?;
    let doc = parse_hierarchy(&content, vars)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        units = doc.units.len(),
        "Loaded hierarchy document"
    );
    Ok(doc)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_requirements_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
resources:
  s3_buckets:
    blueprint-{{{{ account_id }}}}:
      purpose: blueprint
      removalPolicy: destroy
settings:
  qualifier: abc123
"#
        )
        .unwrap();

        let vars = TemplateVars::new(Some("111122223333".into()), None);
        let doc = load_requirements(file.path(), &vars).unwrap();
        assert!(doc.resources.s3_buckets.contains_key("blueprint-111122223333"));
        assert_eq!(doc.settings.qualifier.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_hierarchy(dir.path().join("absent.yaml"), &TemplateVars::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = parse_hierarchy("domainUnits: [name: {", &TemplateVars::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { document: "hierarchy", .. }));
    }
}
