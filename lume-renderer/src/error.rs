//! Error kinds for the render dependency graph (spec §7).
//!
//! Validation and resource-miss errors are recoverable: the offending edge or
//! binding update is logged and skipped, and the caller keeps going. Topology
//! and compatibility errors abort the graph `build()` or pipeline creation
//! that triggered them. Device errors wrap whatever string the `lume-rhi`
//! backend returned.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RdgError {
    /// An edge referenced an unknown pass, an unknown resource name, or an
    /// input-output resource with no producer. Recoverable: logged and the
    /// edge is dropped so `build()` can surface further errors.
    #[error("validation error: {0}")]
    Validation(String),

    /// `flatten_bfs` could not linearize the DAG (a cycle exists). Fatal for
    /// the build that triggered it.
    #[error("topology error: graph is cyclic, flatten produced {flattened}/{total} passes")]
    Topology { flattened: usize, total: usize },

    /// Two shader stages disagree on the type of a descriptor at the same
    /// `(set, binding)` slot. Fatal for the pipeline being built.
    #[error("shader reflection compatibility error: {0}")]
    Compatibility(String),

    /// An underlying GPU call returned a non-success result.
    #[error("device error: {0}")]
    Device(String),

    /// A bind-group update named a binding absent from the pipeline's
    /// combined reflection map. Recoverable: logged and skipped.
    #[error("resource-miss error: binding \"{0}\" not found in pipeline reflection")]
    ResourceMiss(String),
}

impl From<String> for RdgError {
    fn from(s: String) -> Self {
        RdgError::Device(s)
    }
}

pub type RdgResult<T> = Result<T, RdgError>;
