// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the rendering subsystem.

use std::fmt;

/// An error related to the creation of a graphics or compute pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// The backend failed to compile the full pipeline state object.
    CompilationFailed {
        /// A descriptive label for the pipeline, if available.
        label: Option<String>,
        /// Detailed error messages from the backend.
        details: String,
    },
    /// A required graphics feature is not supported by the device.
    FeatureNotSupported(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::CompilationFailed { label, details } => {
                write!(
                    f,
                    "Pipeline compilation failed for '{}': {}",
                    label.as_deref().unwrap_or("Unknown"),
                    details
                )
            }
            PipelineError::FeatureNotSupported(msg) => {
                write!(f, "Feature not supported: {msg}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error related to the creation or use of a GPU resource (buffers, textures,
/// queries, pipelines).
#[derive(Debug)]
pub enum ResourceError {
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// The device ran out of memory for the requested allocation.
    OutOfMemory {
        /// The number of bytes that were requested.
        requested_bytes: u64,
    },
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::OutOfMemory { requested_bytes } => {
                write!(f, "Out of GPU memory allocating {requested_bytes} bytes.")
            }
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A high-level error that can occur within the renderer or the graphics device.
#[derive(Debug)]
pub enum RenderError {
    /// A pass (or the device) failed to create its resources during setup. The renderer
    /// refuses to start.
    InitializationFailed(String),
    /// An invariant that an earlier step should have guaranteed does not hold, such as a
    /// missing pipeline variant or a resource found in the wrong access state.
    InternalInvariantViolation(String),
    /// Recreating size-dependent resources failed. The previous resources are kept.
    ResizeFailed {
        /// The requested width.
        width: u32,
        /// The requested height.
        height: u32,
        /// The underlying reason.
        reason: String,
    },
    /// A critical rendering operation failed.
    RenderingFailed(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The graphics device was lost and must be recreated.
    DeviceLost,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize renderer: {msg}")
            }
            RenderError::InternalInvariantViolation(msg) => {
                write!(f, "Internal invariant violated: {msg}")
            }
            RenderError::ResizeFailed {
                width,
                height,
                reason,
            } => write!(f, "Resize to {width}x{height} failed: {reason}"),
            RenderError::RenderingFailed(msg) => {
                write!(f, "A critical rendering operation failed: {msg}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::DeviceLost => write!(
                f,
                "The graphics device was lost and needs to be reinitialized."
            ),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn pipeline_error_display() {
        let err = PipelineError::CompilationFailed {
            label: Some("BasePass".to_string()),
            details: "missing entry point".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Pipeline compilation failed for 'BasePass': missing entry point"
        );
    }

    #[test]
    fn resource_error_display_wrapping_pipeline_error() {
        let res_err: ResourceError = PipelineError::FeatureNotSupported("VRS".to_string()).into();
        assert_eq!(
            format!("{res_err}"),
            "Pipeline resource error: Feature not supported: VRS"
        );
        assert!(res_err.source().is_some());
    }

    #[test]
    fn render_error_display_wrapping_resource_error() {
        let res_err: ResourceError = PipelineError::FeatureNotSupported("VRS".to_string()).into();
        let render_err: RenderError = res_err.into();
        assert_eq!(
            format!("{render_err}"),
            "Graphics resource operation failed: Pipeline resource error: \
             Feature not supported: VRS"
        );
        assert!(render_err.source().is_some());
        assert!(render_err.source().and_then(|e| e.source()).is_some());
    }

    #[test]
    fn out_of_memory_display() {
        let err: RenderError = ResourceError::OutOfMemory {
            requested_bytes: 4096,
        }
        .into();
        assert_eq!(
            format!("{err}"),
            "Graphics resource operation failed: Out of GPU memory allocating 4096 bytes."
        );
    }

    #[test]
    fn invariant_violation_is_distinct() {
        let err = RenderError::InternalInvariantViolation("no pipeline for key".to_string());
        assert_eq!(format!("{err}"), "Internal invariant violated: no pipeline for key");
        assert!(err.source().is_none());
    }
}
