use thiserror::Error;

/// Errors surfaced by the band-energy pipeline and its collaborators.
///
/// Acquisition errors are fatal to starting the render loop. Per-tick errors
/// (`SpectrumRead`, `Surface`) are logged by the scheduler and never stop it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisualizerError {
    #[error("permission to capture audio was denied: {0}")]
    PermissionDenied(String),

    #[error("audio capture failed: {0}")]
    CaptureFailed(String),

    #[error("audio capability unsupported: {0}")]
    CapabilityUnsupported(String),

    #[error("audio analyser unavailable: {0}")]
    AnalyserUnavailable(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("operation not allowed in state {0}")]
    InvalidState(&'static str),

    #[error("spectrum read failed: {0}")]
    SpectrumRead(String),

    #[error("draw surface error: {0}")]
    Surface(String),
}

impl VisualizerError {
    /// True for the errors that prevent the loop from ever entering `Running`.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            VisualizerError::PermissionDenied(_)
                | VisualizerError::CaptureFailed(_)
                | VisualizerError::CapabilityUnsupported(_)
                | VisualizerError::AnalyserUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VisualizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_failures_are_classified() {
        assert!(VisualizerError::PermissionDenied("x".into()).is_acquisition_failure());
        assert!(VisualizerError::AnalyserUnavailable("x".into()).is_acquisition_failure());
        assert!(!VisualizerError::InvalidParameter("x".into()).is_acquisition_failure());
        assert!(!VisualizerError::Surface("x".into()).is_acquisition_failure());
    }

    #[test]
    fn messages_carry_context() {
        let err = VisualizerError::InvalidParameter("bar count must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "invalid parameter: bar count must be at least 1"
        );
    }
}
