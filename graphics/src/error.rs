//! Graphics error types.

use std::time::Duration;

use thiserror::Error;

use crate::graph::GraphError;

/// Caller errors raised by resource registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The name is already bound to another resource of the same class.
    #[error("{kind} named '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },
    /// The handle or logical ID does not resolve to a live resource.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("GPU device lost")]
    DeviceLost,
    /// A bounded wait expired before the device signaled.
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: &'static str, timeout: Duration },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("surface outdated, needs reconfiguration")]
    SurfaceOutdated,
    #[error("surface lost, needs recreation")]
    SurfaceLost,
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");
    }

    #[test]
    fn timeout_display() {
        let err = GraphicsError::Timeout {
            what: "frame fence",
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "timed out after 250ms waiting for frame fence");
    }

    #[test]
    fn resource_error_converts() {
        let err: GraphicsError = ResourceError::AlreadyExists {
            kind: "buffer",
            name: "scene_ubo".into(),
        }
        .into();
        assert_eq!(err.to_string(), "buffer named 'scene_ubo' already exists");
    }
}
