//! Operation identities and lifecycle phases.
//!
//! Operations are referenced by opaque, comparable identities. An identity
//! is resolved exactly once, at assembly time, into a direct call target
//! stored in the pipeline; nothing in the runtime looks an operation up by
//! name during an invocation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, comparable operation identity.
///
/// Identities are created by descriptor-population collaborators and are
/// only ever compared, ordered, and hashed by the core. Two identities are
/// the same operation exactly when they compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Create an operation identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the declared name of this operation.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OperationId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Lifecycle phase of a component instance.
///
/// Each phase has its own interceptor pipeline, assembled alongside the
/// per-operation pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// Runs once after an instance is allocated, before the instance
    /// handle is returned.
    PostConstruct,

    /// Runs exactly once before an instance's resources are released.
    PreDestroy,

    /// Runs before an instance is passivated.
    PrePassivate,

    /// Runs after an instance is re-activated.
    PostActivate,
}

impl LifecyclePhase {
    /// All lifecycle phases, in pipeline-assembly order.
    pub fn all() -> [LifecyclePhase; 4] {
        [
            Self::PostConstruct,
            Self::PreDestroy,
            Self::PrePassivate,
            Self::PostActivate,
        ]
    }

    /// The pseudo-operation identity used when a phase pipeline is invoked.
    pub fn operation_id(&self) -> OperationId {
        OperationId::new(self.to_string())
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostConstruct => write!(f, "post-construct"),
            Self::PreDestroy => write!(f, "pre-destroy"),
            Self::PrePassivate => write!(f, "pre-passivate"),
            Self::PostActivate => write!(f, "post-activate"),
        }
    }
}
