//! # Vessel Pipeline
//!
//! `vessel_pipeline` builds the deterministic, ordered invocation
//! pipelines at the heart of the Vessel container. A component descriptor
//! collects interceptor contributions from multiple sources (class-level,
//! per-operation, lifecycle-phase); the assembler merges them into one
//! frozen pipeline per phase and operation, enforcing the ordering and
//! exclusion rules and failing fatally on unresolved references.
//!
//! ## Crate Structure
//!
//! - **order**: the priority-ordered chain builder
//! - **context**: per-instance and per-invocation keyed data stores
//! - **interceptor**: the interceptor and unit-factory contracts
//! - **pipeline**: frozen pipelines and per-instance chains
//! - **priority**: fixed ordering bands
//! - **units**: container-provided units (injection, instantiation,
//!   terminals, context propagation)
//! - **descriptor**: component and view descriptors
//! - **assembler**: the merge algorithm

pub mod assembler;
pub mod context;
pub mod descriptor;
pub mod interceptor;
pub mod order;
pub mod pipeline;
pub mod priority;
pub mod units;

// Re-export key types for convenience
pub use assembler::{ComponentAssembly, PhasePipelines, PipelineAssembler, ViewPlan};
pub use context::{
    ambient_component_key, instance_key, ContextKey, Holder, InstanceContext, InvocationContext,
};
pub use descriptor::{
    instance_factory, typed_callback, typed_operation, ComponentDescriptor, InstanceFactory,
    InterceptorBinding, LifecycleCallback, ResourceInjection, TargetOperation, ViewDescriptor,
};
pub use interceptor::{FnInterceptor, FnUnit, ImmediateUnit, Interceptor, InterceptorUnit, Next};
pub use order::OrderedChain;
pub use pipeline::{InterceptorChain, InterceptorPipeline};
