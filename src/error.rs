//! Error types surfaced by the map entity core.

use bevy_ecs::entity::Entity;
use thiserror::Error;

use crate::script::ScriptRef;

/// Failures reported by configuration calls and by script invocations.
///
/// Ordinary negative answers (no collision, not traversable) are plain
/// values and never use this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    /// A call tried to install something unusable, such as a nil callback.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A script predicate or callback raised an error.
    #[error("script function {func:?} failed during {context}: {message}")]
    ExternalCallFailure {
        func: ScriptRef,
        context: String,
        message: String,
    },
    /// The entity does not support the requested operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// The entity handle does not refer to a live map entity.
    #[error("no such entity: {0:?}")]
    NoSuchEntity(Entity),
}

impl EntityError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidConfiguration(detail.into())
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self::UnsupportedOperation(detail.into())
    }
}
