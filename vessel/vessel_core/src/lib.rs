//! # Vessel Core
//!
//! `vessel_core` provides the fundamental building blocks for the Vessel
//! managed-component container: error types, ID definitions, and the data
//! types shared by the pipeline and runtime crates.
//!
//! ## Crate Structure
//!
//! - **error**: Error hierarchy for all Vessel subsystems
//! - **id**: Strongly-typed identifier types
//! - **types**: Component states, metadata, operation identities, and
//!   lifecycle phases

pub mod error;
pub mod id;
pub mod types;

// Re-export key types for convenience
pub use error::{AssemblyError, Error, InvocationError, LifecycleError, Result};
pub use id::{ComponentId, InstanceId, ProxyId};
pub use types::{ComponentMetadata, ComponentState, LifecyclePhase, OperationId};
