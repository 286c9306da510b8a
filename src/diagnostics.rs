// ABOUTME: Diagnostics accumulator for non-fatal warnings during a pipeline run.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during a run.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Create a warning for tasks of the previous revision left running.
    pub fn retire_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RetireFailed,
            message: message.into(),
        }
    }

    /// Create a warning for a non-fatal hook failure.
    pub fn hook_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::HookFailed,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Stopping previous-revision tasks failed after the rollout succeeded.
    RetireFailed,
    /// A post-deploy or on-error hook failed.
    HookFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::retire_failed("engine went away"));
        diag.warn(Warning::hook_failed("post-deploy exited with 1"));

        assert!(diag.has_warnings());
        assert_eq!(diag.into_warnings().len(), 2);
    }

    #[test]
    fn warning_constructors_set_correct_kind() {
        assert_eq!(Warning::retire_failed("x").kind, WarningKind::RetireFailed);
        assert_eq!(Warning::hook_failed("x").kind, WarningKind::HookFailed);
    }

    #[test]
    fn warnings_serialize_with_snake_case_kind() {
        let json = serde_json::to_value(Warning::retire_failed("stop failed")).unwrap();
        assert_eq!(json["kind"], "retire_failed");
        assert_eq!(json["message"], "stop failed");
    }
}
