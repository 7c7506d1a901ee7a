//! Error types for the Vessel container.
//!
//! This module defines the error hierarchy used throughout the system.
//! Errors are organized by subsystem: assembly-time errors are fatal and
//! reported when a component is deployed, lifecycle errors surface from
//! instance creation and destruction, and invocation errors surface from
//! pipeline execution.
//!
//! The root error type, `Error`, can wrap any of the subsystem-specific
//! errors, allowing for uniform error handling at the top level.

use crate::id::{ComponentId, InstanceId, ProxyId};
use crate::types::OperationId;
use thiserror::Error;

/// Root error type for the Vessel container.
#[derive(Debug, Error)]
pub enum Error {
    /// Pipeline assembly errors, fatal at deploy time
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Component and instance lifecycle errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Pipeline invocation errors
    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    /// General runtime errors
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while assembling interceptor pipelines from a descriptor.
///
/// Assembly errors are fatal: the component fails to deploy and no partial
/// pipelines are installed.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// An interceptor or exclusion flag was registered against an
    /// operation the component does not declare
    #[error("Operation not declared on the component: {0}")]
    UnresolvedOperation(OperationId),

    /// The descriptor has no way to produce the primary instance
    #[error("Component {0} has no instance factory")]
    MissingInstanceFactory(String),

    /// Two views with the same name were declared
    #[error("View declared more than once: {0}")]
    DuplicateView(String),

    /// A view maps an operation that the component does not declare
    #[error("View {view} maps unknown component operation: {operation}")]
    UnknownViewOperation {
        /// Name of the offending view
        view: String,

        /// The unresolved component operation
        operation: OperationId,
    },

    /// The component name was empty
    #[error("Component name must not be empty")]
    EmptyComponentName,
}

/// Errors raised by the component lifecycle state machine.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Instance creation was attempted while the component is stopping
    /// or stopped
    #[error("Component {0} is unavailable")]
    Unavailable(ComponentId),

    /// A bounded gate wait elapsed before the component started
    #[error("Component {component} did not start within {waited_ms}ms")]
    CreateTimeout {
        /// The component being waited on
        component: ComponentId,

        /// How long the caller waited
        waited_ms: u64,
    },

    /// A post-construct callback failed; construction was abandoned and
    /// partially acquired resources were released
    #[error("Post-construct failed: {0}")]
    PostConstructFailed(String),

    /// An operation was invoked on an instance that has been destroyed
    #[error("Instance {0} has been destroyed")]
    InstanceDestroyed(InstanceId),

    /// An operation was invoked on a proxy that has been destroyed
    #[error("Proxy {0} has been destroyed")]
    ProxyDestroyed(ProxyId),
}

/// Errors raised while executing an interceptor pipeline.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The invoked operation has no pipeline on this component or view
    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// The last unit in a chain called proceed; every chain must end in a
    /// terminal unit
    #[error("Interceptor chain for {0} proceeded past its terminal unit")]
    ChainExhausted(OperationId),

    /// A terminal unit ran without an instance bound to the invocation
    #[error("No instance bound to invocation of {0}")]
    MissingInstance(OperationId),

    /// The target instance holder did not have the type the resolved
    /// operation expects
    #[error("Target instance is not a {expected}")]
    TargetTypeMismatch {
        /// The expected concrete type
        expected: String,
    },

    /// A user interceptor or target operation failed
    #[error("{0}")]
    Failed(String),
}

/// Result type used throughout the Vessel container.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationId;

    #[test]
    fn test_error_conversion() {
        let asm_err = AssemblyError::UnresolvedOperation(OperationId::new("missing"));
        let error: Error = asm_err.into();
        assert!(matches!(error, Error::Assembly(_)));

        let lc_err = LifecycleError::Unavailable(ComponentId::new());
        let error: Error = lc_err.into();
        assert!(matches!(error, Error::Lifecycle(_)));

        let inv_err = InvocationError::OperationNotFound(OperationId::new("op"));
        let error: Error = inv_err.into();
        assert!(matches!(error, Error::Invocation(_)));
    }

    #[test]
    fn test_error_display() {
        let component_id = ComponentId::new();
        let error: Error = LifecycleError::Unavailable(component_id).into();
        let display = format!("{}", error);
        assert!(display.contains(&format!("Component {} is unavailable", component_id)));
    }

    #[test]
    fn test_invocation_failed_passthrough() {
        // Business errors must surface with their message unchanged
        let error = InvocationError::Failed("insufficient funds".to_string());
        assert_eq!(error.to_string(), "insufficient funds");
    }
}
