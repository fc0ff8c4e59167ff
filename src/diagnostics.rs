//! Non-fatal conditions observed during synthesis
//!
//! Every diagnostic is logged at `warn` level when recorded and kept so the
//! caller can report or assert on it after the run.

use std::fmt;

use crate::graph::ResourceGraph;

/// Informational diagnostic from synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Resource or config entry the diagnostic is about
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A factory prerequisite was absent; the resource and its dependents were skipped.
    MissingPrerequisite,
    /// A membership principal could not be resolved; that membership was skipped.
    UnresolvedMember,
    /// A configuration entry was ignored.
    IgnoredConfig,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::MissingPrerequisite => "missing-prerequisite",
            DiagnosticKind::UnresolvedMember => "unresolved-member",
            DiagnosticKind::IgnoredConfig => "ignored-config",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(
        &mut self,
        kind: DiagnosticKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic {
            kind,
            subject: subject.into(),
            message: message.into(),
        };
        tracing::warn!(
            kind = %diagnostic.kind,
            subject = %diagnostic.subject,
            "{}",
            diagnostic.message
        );
        self.entries.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Graph under construction plus the diagnostics gathered while building it
#[derive(Debug, Default)]
pub struct Synthesis {
    pub graph: ResourceGraph,
    pub diagnostics: Diagnostics,
}

impl Synthesis {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_filter_by_kind() {
        let mut d = Diagnostics::new();
        d.warn(DiagnosticKind::UnresolvedMember, "Leads/owner", "no such user");
        d.warn(DiagnosticKind::MissingPrerequisite, "env_profile", "no blueprint");

        assert_eq!(d.len(), 2);
        let members: Vec<_> = d.of_kind(DiagnosticKind::UnresolvedMember).collect();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].subject, "Leads/owner");
    }
}
