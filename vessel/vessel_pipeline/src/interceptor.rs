//! Interceptor contracts.
//!
//! An interceptor is a single middleware unit in a chain-of-responsibility
//! invocation. It either calls [`Next::proceed`] to hand control to the
//! next unit, or terminates the chain by returning a value or an error.
//! Control flow is an explicit `Result`; there is no unwinding-based
//! short-circuit.
//!
//! An [`InterceptorUnit`] is the stateless factory side of the contract:
//! given an instance context it produces the interceptor that will serve
//! that instance. Units must not retain cross-instance mutable state.

use serde_json::Value;
use std::sync::Arc;

use vessel_core::error::{InvocationError, Result};

use crate::context::{InstanceContext, InvocationContext};

/// A single middleware unit in an invocation chain.
pub trait Interceptor: Send + Sync {
    /// Handle one invocation.
    ///
    /// Implementations may inspect and mutate the invocation context, and
    /// must either call `next.proceed(ctx)` exactly once or terminate the
    /// chain by returning without proceeding. Errors propagate to the
    /// caller unchanged.
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value>;
}

/// Handle on the remainder of an interceptor chain.
pub struct Next<'c> {
    rest: &'c [Box<dyn Interceptor>],
}

impl<'c> Next<'c> {
    pub(crate) fn new(rest: &'c [Box<dyn Interceptor>]) -> Self {
        Self { rest }
    }

    /// Invoke the next unit in the chain.
    ///
    /// Fails with [`InvocationError::ChainExhausted`] if called past the
    /// final unit; assembled chains always end in a terminal unit that
    /// never proceeds.
    pub fn proceed(self, ctx: &mut InvocationContext<'_>) -> Result<Value> {
        match self.rest.split_first() {
            Some((head, tail)) => head.invoke(ctx, Next::new(tail)),
            None => Err(InvocationError::ChainExhausted(ctx.operation().clone()).into()),
        }
    }

    /// Number of units remaining after this point.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// An interceptor backed by a plain function or closure.
pub struct FnInterceptor<F>(F);

impl<F> FnInterceptor<F>
where
    F: Fn(&mut InvocationContext<'_>, Next<'_>) -> Result<Value> + Send + Sync,
{
    /// Wrap a function as an interceptor.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(&mut InvocationContext<'_>, Next<'_>) -> Result<Value> + Send + Sync,
{
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value> {
        (self.0)(ctx, next)
    }
}

/// A stateless factory producing the interceptor that serves one instance.
pub trait InterceptorUnit: Send + Sync {
    /// Produce the interceptor for the given instance.
    ///
    /// Called once per instance per pipeline, while the instance is being
    /// constructed. The unit may pre-populate the instance context.
    fn create(&self, instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>>;
}

/// Delegating wrapper that lets one interceptor value serve every instance.
struct Shared(Arc<dyn Interceptor>);

impl Interceptor for Shared {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value> {
        self.0.invoke(ctx, next)
    }
}

/// A unit that hands out the same stateless interceptor for every instance.
pub struct ImmediateUnit {
    interceptor: Arc<dyn Interceptor>,
}

impl ImmediateUnit {
    /// Wrap a stateless interceptor.
    pub fn new(interceptor: impl Interceptor + 'static) -> Self {
        Self {
            interceptor: Arc::new(interceptor),
        }
    }

    /// Wrap an already-shared stateless interceptor.
    pub fn from_arc(interceptor: Arc<dyn Interceptor>) -> Self {
        Self { interceptor }
    }
}

impl InterceptorUnit for ImmediateUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(Shared(Arc::clone(&self.interceptor))))
    }
}

/// A unit backed by a plain factory function.
pub struct FnUnit<F>(F);

impl<F> FnUnit<F>
where
    F: Fn(&mut InstanceContext) -> Result<Box<dyn Interceptor>> + Send + Sync,
{
    /// Wrap a factory function as a unit.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> InterceptorUnit for FnUnit<F>
where
    F: Fn(&mut InstanceContext) -> Result<Box<dyn Interceptor>> + Send + Sync,
{
    fn create(&self, instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        (self.0)(instance)
    }
}
