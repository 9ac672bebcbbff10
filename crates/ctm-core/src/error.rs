//! The accumulating validation log.
//!
//! Sub-crates define their own error enums and wrap [`ErrorLog`] as a
//! `Validation` variant.  Configuration problems are never reported one at
//! a time: every validation pass appends to a single `ErrorLog`, and the
//! caller converts it into an error only once the pass is complete, so a
//! scenario author sees every defect together.

use std::fmt;

// ── ErrorLog ──────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Severity {
    Warning,
    Error,
}

/// One entry of an [`ErrorLog`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Issue {
    pub severity: Severity,
    pub message:  String,
}

/// Accumulates validation problems across a whole configuration pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorLog {
    issues: Vec<Issue>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.issues.push(Issue { severity: Severity::Error, message: message.into() });
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.issues.push(Issue { severity: Severity::Warning, message: message.into() });
    }

    /// Append every issue of `other`.
    pub fn extend(&mut self, other: ErrorLog) {
        self.issues.extend(other.issues);
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.message.as_str())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .map(|i| i.message.as_str())
    }

    /// `Ok(self)` if only warnings were logged, `Err(self)` otherwise.
    /// Callers wrap the error side in their own `Validation` variant.
    pub fn into_result(self) -> Result<ErrorLog, ErrorLog> {
        if self.has_errors() {
            Err(self)
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            let tag = match issue.severity {
                Severity::Warning => "warning",
                Severity::Error   => "error",
            };
            writeln!(f, "  {tag}: {}", issue.message)?;
        }
        Ok(())
    }
}
