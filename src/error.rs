//! Crate-wide error types.
//!
//! Everything that can fail at the rendering core's boundaries is expressed
//! through [`EngineError`]. Capability limits (e.g. a multisample count above
//! the device maximum) are clamped silently and never surface here, and color
//! string parsing falls back to a default instead of erroring — see
//! [`Color::from_hex_or`](crate::Color::from_hex_or).

use std::fmt;

/// Errors produced by the rendering core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A frame was requested before a required collaborator existed
    /// (no active camera, or no initialized render surface).
    MissingDependency(&'static str),
    /// The pass sequence is unusable: empty, or the clear pass is missing,
    /// duplicated, or not first.
    InvalidPipelineState(String),
    /// A uniform value has no defined deep-copy rule (a live handle),
    /// so the material holding it cannot be cloned.
    UncloneableState {
        /// Name of the offending uniform.
        uniform: String,
    },
    /// A fog-subscribing material was compiled before the fog override
    /// was installed into the chunk library.
    ShaderNotPatched,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDependency(what) => write!(f, "missing dependency: {what}"),
            Self::InvalidPipelineState(msg) => write!(f, "invalid pipeline state: {msg}"),
            Self::UncloneableState { uniform } => {
                write!(f, "uniform '{uniform}' holds a live handle and cannot be deep-copied")
            }
            Self::ShaderNotPatched => {
                write!(f, "fog material compiled before the fog override was installed")
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = EngineError::MissingDependency("camera");
        assert_eq!(err.to_string(), "missing dependency: camera");

        let err = EngineError::UncloneableState {
            uniform: "u_gradient".to_string(),
        };
        assert!(err.to_string().contains("u_gradient"));

        let err = EngineError::ShaderNotPatched;
        assert!(err.to_string().contains("fog override"));
    }
}
