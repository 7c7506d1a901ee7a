//! Data structures used throughout the system.

pub mod component;
pub mod operation;

pub use component::{ComponentMetadata, ComponentState};
pub use operation::{LifecyclePhase, OperationId};
