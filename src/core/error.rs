//! Error types for `egg` operations.
//!
//! This module defines the canonical error type used throughout the CLI.
//! Every subsystem returns `Result<T, EggError>`; the taxonomy is closed and
//! matches the error table of the project specification one-for-one so the
//! dispatcher can map it onto an exit code without guessing.

use std::io;
use thiserror::Error;

/// Canonical error type for all `egg` operations.
///
/// Uses `thiserror` for automatic `Display`/`Error` impls. Variants marked
/// `#[from]` auto-convert from the standard library error they wrap.
#[derive(Error, Debug)]
pub enum EggError {
    /// I/O error (auto-converts from `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `egg.yaml` (or equivalent) is absent; operator must run `init`.
    #[error("manifest not found at {0}")]
    ManifestNotFound(String),

    /// The manifest file exists but cannot be parsed in any supported format.
    #[error("manifest corrupt: {0}")]
    ManifestCorrupt(String),

    /// `Save` preflight failed one or more invariants; list is non-empty.
    #[error("manifest invalid: {}", .0.join("; "))]
    ManifestInvalid(Vec<String>),

    /// `AddReplace` would silently overwrite a differing replace directive.
    #[error("replace conflict for {module}: existing target differs from requested ({existing} != {requested})")]
    ReplaceConflict {
        module: String,
        existing: String,
        requested: String,
    },

    /// Backend manifests disagree on local-replace vs. version-pin mode.
    #[error("inconsistent dependency modes across backends: {0}")]
    InconsistentModes(String),

    /// One or more required external tools were not found on PATH.
    #[error("toolchain missing: {}", .0.join(", "))]
    ToolchainMissing(Vec<String>),

    /// The external code generator exited non-zero.
    #[error("code generation failed (exit {exit_code}):\n{stderr_tail}")]
    GenerationFailed { exit_code: i32, stderr_tail: String },

    /// A requested or computed port is already taken.
    #[error("port {0} already in use")]
    PortInUse(u16),

    /// A service name collides with the opposite service type, or is
    /// already present under the same type.
    #[error("name already taken: {0}")]
    NameTaken(String),

    /// Multi-arch build requested without push enabled.
    #[error("push is required when building for more than one platform")]
    PushRequiredForMultiArch,

    /// Template destination exists with different content and `--force`
    /// was not passed.
    #[error("file already exists: {0} (use --force to overwrite)")]
    FileExists(String),

    /// The advisory lock could not be acquired within the grace period.
    #[error("repository is busy: {0}")]
    Busy(String),

    /// A template referenced a context variable that does not resolve.
    #[error("template variable unresolved: {0}")]
    TemplateUnresolved(String),

    /// An external tool exited non-zero and there is no further CLI-side
    /// work to do; the caller should propagate this exit code verbatim.
    #[error("tool exited with code {code}: {tool}")]
    ToolExit { tool: String, code: i32 },

    /// Input failed basic structural/semantic validation outside the
    /// manifest-invariant path (e.g. malformed service id, empty platform
    /// set).
    #[error("validation error: {0}")]
    Validation(String),
}

impl EggError {
    /// Maps this error onto the CLI's process exit code (spec §6.4): every
    /// mapped error is `1`; callers that propagate a tool's own exit code
    /// do so before constructing an `EggError` at all.
    pub fn exit_code(&self) -> i32 {
        match self {
            EggError::ToolExit { code, .. } => *code,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_invalid_joins_offenders() {
        let err = EggError::ManifestInvalid(vec!["P1 violated".into(), "P2 violated".into()]);
        assert_eq!(format!("{}", err), "manifest invalid: P1 violated; P2 violated");
    }

    #[test]
    fn tool_exit_carries_its_own_code() {
        let err = EggError::ToolExit { tool: "buf".into(), code: 42 };
        assert_eq!(err.exit_code(), 42);
    }

    #[test]
    fn other_errors_map_to_exit_one() {
        let err = EggError::NameTaken("user".into());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn name_taken_display() {
        let err = EggError::NameTaken("user".into());
        assert_eq!(format!("{}", err), "name already taken: user");
    }
}
