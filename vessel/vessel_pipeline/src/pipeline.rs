//! Frozen interceptor pipelines and per-instance chains.
//!
//! A pipeline is an immutable ordered sequence of interceptor units, built
//! once per (component, operation-or-phase) pair and shared by every
//! instance. Binding a pipeline against an instance context produces the
//! chain that actually executes invocations for that instance.

use log::trace;
use serde_json::Value;
use std::sync::Arc;

use vessel_core::error::Result;

use crate::context::{InstanceContext, InvocationContext};
use crate::interceptor::{Interceptor, InterceptorUnit, Next};

/// A named unit position in a frozen pipeline.
#[derive(Clone)]
pub(crate) struct PipelineUnit {
    pub(crate) name: Arc<str>,
    pub(crate) unit: Arc<dyn InterceptorUnit>,
}

/// An immutable, ordered sequence of interceptor units.
///
/// Safe to share and bind concurrently; all mutable state lives in the
/// per-instance and per-call contexts.
#[derive(Clone)]
pub struct InterceptorPipeline {
    units: Arc<[PipelineUnit]>,
}

impl std::fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("units", &self.unit_names())
            .finish()
    }
}

impl InterceptorPipeline {
    pub(crate) fn new(units: Vec<(Arc<str>, Arc<dyn InterceptorUnit>)>) -> Self {
        Self {
            units: units
                .into_iter()
                .map(|(name, unit)| PipelineUnit { name, unit })
                .collect(),
        }
    }

    /// An empty pipeline.
    pub fn empty() -> Self {
        Self {
            units: Arc::from(Vec::new()),
        }
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if the pipeline has no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The unit names in chain order, for diagnostics.
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_ref()).collect()
    }

    /// Create the per-instance interceptors for this pipeline, in order.
    pub fn instantiate(&self, instance: &mut InstanceContext) -> Result<Vec<Box<dyn Interceptor>>> {
        let mut interceptors = Vec::with_capacity(self.units.len());
        for unit in self.units.iter() {
            trace!("binding unit {}", unit.name);
            interceptors.push(unit.unit.create(instance)?);
        }
        Ok(interceptors)
    }

    /// Bind this pipeline against an instance, producing an executable
    /// chain.
    pub fn bind(&self, instance: &mut InstanceContext) -> Result<InterceptorChain> {
        Ok(InterceptorChain::new(self.instantiate(instance)?))
    }
}

/// An executable chain of interceptors bound to one instance.
///
/// Re-entrant: each invocation gets its own [`InvocationContext`], so a
/// chain may serve concurrent calls.
pub struct InterceptorChain {
    interceptors: Box<[Box<dyn Interceptor>]>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl InterceptorChain {
    /// Build a chain from bound interceptors in execution order.
    pub fn new(interceptors: Vec<Box<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into_boxed_slice(),
        }
    }

    /// Number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Check if the chain has no interceptors.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Execute the chain for one invocation.
    pub fn invoke(&self, ctx: &mut InvocationContext<'_>) -> Result<Value> {
        Next::new(&self.interceptors).proceed(ctx)
    }
}
