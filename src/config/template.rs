//! Placeholder expansion for configuration documents
//!
//! Two conventions are supported before YAML parsing:
//!
//! - `{{ account_id }}` / `{{ region }}` from the run environment
//! - `{% set NAME = "value" %}` directives for a fixed set of names, which
//!   are removed from the text and whose value replaces `{{ NAME }}`
//!
//! Anything else, including placeholders whose value is unknown, is left
//! untouched.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Names that may be bound with `{% set %}`
pub const SETTABLE_NAMES: [&str; 7] = [
    "source_bucket_name",
    "target_bucket_name",
    "metadata_bucket_name",
    "domain_name",
    "project_name",
    "job1",
    "job2",
];

static SET_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{%\s*set\s+([A-Za-z_][A-Za-z0-9_]*)\s*=\s*"([^"]*)"\s*%\}[ \t]*\r?\n?"#)
        .expect("set directive regex is valid")
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Values known to the run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    pub account_id: Option<String>,
    pub region: Option<String>,
}

impl TemplateVars {
    pub fn new(account_id: Option<String>, region: Option<String>) -> Self {
        Self { account_id, region }
    }
}

/// Expand placeholders in `content`
pub fn render(content: &str, vars: &TemplateVars) -> String {
    let mut bindings: BTreeMap<String, String> = BTreeMap::new();
    if let Some(account) = &vars.account_id {
        bindings.insert("account_id".to_string(), account.clone());
    }
    if let Some(region) = &vars.region {
        bindings.insert("region".to_string(), region.clone());
    }

    let without_directives = SET_DIRECTIVE.replace_all(content, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        if SETTABLE_NAMES.contains(&name) {
            bindings.insert(name.to_string(), caps[2].to_string());
            String::new()
        } else {
            caps[0].to_string()
        }
    });

    PLACEHOLDER
        .replace_all(&without_directives, |caps: &regex::Captures<'_>| {
            bindings
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
