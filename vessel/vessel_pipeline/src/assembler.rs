//! Pipeline assembly.
//!
//! The assembler consumes a [`ComponentDescriptor`] and produces one
//! frozen [`InterceptorPipeline`] per lifecycle phase and per declared
//! operation, plus the per-view ring pipelines. Assembly is deterministic:
//! identical descriptors always yield identical chains, and a priority tie
//! always resolves by registration order. Any unresolved reference fails
//! the whole assembly; no partial pipelines are ever installed.

use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use vessel_core::error::{AssemblyError, Result};
use vessel_core::types::{LifecyclePhase, OperationId};

use crate::descriptor::{ComponentDescriptor, InterceptorBinding};
use crate::interceptor::InterceptorUnit;
use crate::order::OrderedChain;
use crate::pipeline::InterceptorPipeline;
use crate::priority;
use crate::units::{
    ContextPropagationUnit, InjectionUnit, InstanceReleaseUnit, InstantiationUnit,
    LifecycleTerminalUnit, TargetCallUnit, UninjectionUnit,
};

type NamedUnit = (Arc<str>, Arc<dyn InterceptorUnit>);

/// The four frozen lifecycle pipelines of a component.
#[derive(Debug)]
pub struct PhasePipelines {
    /// Runs when an instance is constructed.
    pub post_construct: InterceptorPipeline,

    /// Runs exactly once when an instance is destroyed.
    pub pre_destroy: InterceptorPipeline,

    /// Runs before an instance is passivated.
    pub pre_passivate: InterceptorPipeline,

    /// Runs after an instance is re-activated.
    pub post_activate: InterceptorPipeline,
}

impl PhasePipelines {
    /// Get the pipeline for a phase.
    pub fn pipeline(&self, phase: LifecyclePhase) -> &InterceptorPipeline {
        match phase {
            LifecyclePhase::PostConstruct => &self.post_construct,
            LifecyclePhase::PreDestroy => &self.pre_destroy,
            LifecyclePhase::PrePassivate => &self.pre_passivate,
            LifecyclePhase::PostActivate => &self.post_activate,
        }
    }
}

/// The frozen per-view plan: ring pipelines and the operation mapping.
///
/// The dispatcher units that cross ring boundaries are appended by the
/// view assembly when a proxy is created, at the fixed latest position of
/// their ring.
#[derive(Debug)]
pub struct ViewPlan {
    /// The view name.
    pub name: String,

    /// View operation identity to component operation identity.
    pub operations: BTreeMap<OperationId, OperationId>,

    /// Client-ring pipeline per view operation, dispatcher not included.
    pub client_pipelines: BTreeMap<OperationId, InterceptorPipeline>,

    /// View-ring pipeline per view operation, dispatcher not included.
    pub view_pipelines: BTreeMap<OperationId, InterceptorPipeline>,

    /// Client-proxy-scoped post-construct pipeline.
    pub client_post_construct: InterceptorPipeline,

    /// Client-proxy-scoped pre-destroy pipeline.
    pub client_pre_destroy: InterceptorPipeline,
}

/// The frozen output of assembly for one component.
#[derive(Debug)]
pub struct ComponentAssembly {
    name: Arc<str>,
    description: String,
    lifecycle: PhasePipelines,
    operations: BTreeMap<OperationId, InterceptorPipeline>,
    views: Vec<Arc<ViewPlan>>,
}

impl ComponentAssembly {
    /// The component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The component description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The lifecycle pipelines.
    pub fn lifecycle(&self) -> &PhasePipelines {
        &self.lifecycle
    }

    /// The per-operation around-invoke pipelines.
    pub fn operations(&self) -> &BTreeMap<OperationId, InterceptorPipeline> {
        &self.operations
    }

    /// Get the pipeline for one operation.
    pub fn operation_pipeline(&self, op: &OperationId) -> Option<&InterceptorPipeline> {
        self.operations.get(op)
    }

    /// The declared operation identities, in identity order.
    pub fn operation_ids(&self) -> Vec<OperationId> {
        self.operations.keys().cloned().collect()
    }

    /// The view plans.
    pub fn views(&self) -> &[Arc<ViewPlan>] {
        &self.views
    }

    /// Get a view plan by name.
    pub fn view(&self, name: &str) -> Option<&Arc<ViewPlan>> {
        self.views.iter().find(|v| v.name == name)
    }

    /// The declared view names.
    pub fn view_names(&self) -> Vec<String> {
        self.views.iter().map(|v| v.name.clone()).collect()
    }
}

/// Assembles frozen pipelines from a component descriptor.
pub struct PipelineAssembler;

impl PipelineAssembler {
    /// Assemble all pipelines for the given descriptor.
    ///
    /// Fails fatally on any unresolved reference; the caller must not
    /// install anything from a failed assembly.
    pub fn assemble(descriptor: ComponentDescriptor) -> Result<ComponentAssembly> {
        Self::validate(&descriptor)?;

        let component: Arc<str> = Arc::from(descriptor.name.as_str());
        let factory = descriptor
            .instance_factory
            .clone()
            .ok_or_else(|| AssemblyError::MissingInstanceFactory(descriptor.name.clone()))?;

        // Post-construct: context propagation, instantiation, injections
        // innermost-first, user contributions, terminal.
        let mut post_construct = OrderedChain::new();
        post_construct.add(
            context_unit(&component),
            priority::construction::CONTEXT_PROPAGATION,
        );
        post_construct.add(
            named("instantiate", InstantiationUnit::new(factory)),
            priority::construction::INSTANTIATION,
        );
        for injection in descriptor.resource_injections.iter().rev() {
            post_construct.add(
                named(
                    &format!("inject:{}", injection.name),
                    InjectionUnit::new(injection.clone()),
                ),
                priority::construction::RESOURCE_INJECTION,
            );
        }
        add_band(
            &mut post_construct,
            priority::construction::USER,
            sorted_band(&descriptor.post_construct),
        );
        post_construct.add(
            named("terminal", LifecycleTerminalUnit),
            priority::construction::TERMINAL,
        );

        // Pre-destroy: context propagation, user contributions while the
        // instance is still live, uninjections in reverse order of
        // injection, instance release, terminal.
        let mut pre_destroy = OrderedChain::new();
        pre_destroy.add(
            context_unit(&component),
            priority::destruction::CONTEXT_PROPAGATION,
        );
        add_band(
            &mut pre_destroy,
            priority::destruction::USER,
            sorted_band(&descriptor.pre_destroy),
        );
        for injection in descriptor.resource_injections.iter() {
            pre_destroy.add(
                named(
                    &format!("uninject:{}", injection.name),
                    UninjectionUnit::new(injection.key.clone()),
                ),
                priority::destruction::UNINJECTION,
            );
        }
        pre_destroy.add(
            named("release-instance", InstanceReleaseUnit),
            priority::destruction::INSTANCE_RELEASE,
        );
        pre_destroy.add(
            named("terminal", LifecycleTerminalUnit),
            priority::destruction::TERMINAL,
        );

        let pre_passivate = passivation_pipeline(&component, &descriptor.pre_passivate);
        let post_activate = passivation_pipeline(&component, &descriptor.post_activate);

        // Around-invoke: context propagation, class-level unless excluded,
        // default-level unless excluded (per-operation exclusion always
        // wins over class-wide declarations), operation-level always,
        // target-call terminal.
        let mut operations = BTreeMap::new();
        for (op, target) in &descriptor.operations {
            let mut chain = OrderedChain::new();
            chain.add(
                context_unit(&component),
                priority::invocation::CONTEXT_PROPAGATION,
            );

            if !descriptor.exclude_class_for.contains(op) {
                add_band(
                    &mut chain,
                    priority::invocation::CLASS_INTERCEPTORS,
                    sorted_band(&descriptor.class_interceptors),
                );
            }

            if !descriptor.exclude_default_interceptors
                && !descriptor.exclude_default_for.contains(op)
            {
                add_band(
                    &mut chain,
                    priority::invocation::DEFAULT_INTERCEPTORS,
                    sorted_band(&descriptor.default_interceptors),
                );
            }

            if let Some(bindings) = descriptor.operation_interceptors.get(op) {
                add_band(
                    &mut chain,
                    priority::invocation::OPERATION_INTERCEPTORS,
                    sorted_band(bindings),
                );
            }

            chain.add(
                named(&format!("target:{}", op), TargetCallUnit::new(target.clone())),
                priority::invocation::TERMINAL,
            );

            operations.insert(op.clone(), InterceptorPipeline::new(chain.into_sorted()));
        }

        // Views: per mapped operation, the client and view ring pipelines
        // (the cross-ring dispatchers are appended at proxy creation), plus
        // the client-scoped lifecycle pipelines.
        let mut views = Vec::with_capacity(descriptor.views.len());
        for view in &descriptor.views {
            let mut client_pipelines = BTreeMap::new();
            let mut view_pipelines = BTreeMap::new();
            for view_op in view.operations.keys() {
                client_pipelines.insert(
                    view_op.clone(),
                    ring_pipeline(&component, &view.client_interceptors),
                );
                view_pipelines.insert(
                    view_op.clone(),
                    ring_pipeline(&component, &view.view_interceptors),
                );
            }

            views.push(Arc::new(ViewPlan {
                name: view.name.clone(),
                operations: view.operations.clone(),
                client_pipelines,
                view_pipelines,
                client_post_construct: client_lifecycle_pipeline(
                    &component,
                    &view.client_post_construct,
                    priority::construction::USER,
                ),
                client_pre_destroy: client_lifecycle_pipeline(
                    &component,
                    &view.client_pre_destroy,
                    priority::destruction::USER,
                ),
            }));
        }

        debug!(
            "assembled component {}: {} operations, {} views",
            component,
            operations.len(),
            views.len()
        );

        Ok(ComponentAssembly {
            name: component,
            description: descriptor.description.clone(),
            lifecycle: PhasePipelines {
                post_construct: InterceptorPipeline::new(post_construct.into_sorted()),
                pre_destroy: InterceptorPipeline::new(pre_destroy.into_sorted()),
                pre_passivate,
                post_activate,
            },
            operations,
            views,
        })
    }

    fn validate(descriptor: &ComponentDescriptor) -> Result<()> {
        if descriptor.name.trim().is_empty() {
            return Err(AssemblyError::EmptyComponentName.into());
        }

        for op in descriptor.operation_interceptors.keys() {
            if !descriptor.operations.contains_key(op) {
                return Err(AssemblyError::UnresolvedOperation(op.clone()).into());
            }
        }
        for op in descriptor
            .exclude_class_for
            .iter()
            .chain(descriptor.exclude_default_for.iter())
        {
            if !descriptor.operations.contains_key(op) {
                return Err(AssemblyError::UnresolvedOperation(op.clone()).into());
            }
        }

        let mut seen = BTreeSet::new();
        for view in &descriptor.views {
            if !seen.insert(view.name.clone()) {
                return Err(AssemblyError::DuplicateView(view.name.clone()).into());
            }
            for component_op in view.operations.values() {
                if !descriptor.operations.contains_key(component_op) {
                    return Err(AssemblyError::UnknownViewOperation {
                        view: view.name.clone(),
                        operation: component_op.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

fn named(name: &str, unit: impl InterceptorUnit + 'static) -> NamedUnit {
    (Arc::from(name), Arc::new(unit))
}

fn context_unit(component: &Arc<str>) -> NamedUnit {
    named(
        "context-propagation",
        ContextPropagationUnit::new(Arc::clone(component)),
    )
}

/// Sort one source's contributions by `(priority, registration order)`.
fn sorted_band(bindings: &[InterceptorBinding]) -> Vec<NamedUnit> {
    let mut chain = OrderedChain::new();
    for binding in bindings {
        chain.add(
            (Arc::clone(&binding.name), Arc::clone(&binding.unit)),
            binding.priority,
        );
    }
    chain.into_sorted()
}

/// Append a pre-sorted band at a fixed band priority; ties preserve the
/// band's internal order.
fn add_band(chain: &mut OrderedChain<NamedUnit>, band: i32, units: Vec<NamedUnit>) {
    for unit in units {
        chain.add(unit, band);
    }
}

fn passivation_pipeline(
    component: &Arc<str>,
    bindings: &[InterceptorBinding],
) -> InterceptorPipeline {
    let mut chain = OrderedChain::new();
    chain.add(
        context_unit(component),
        priority::passivation::CONTEXT_PROPAGATION,
    );
    add_band(&mut chain, priority::passivation::USER, sorted_band(bindings));
    chain.add(
        named("terminal", LifecycleTerminalUnit),
        priority::passivation::TERMINAL,
    );
    InterceptorPipeline::new(chain.into_sorted())
}

fn ring_pipeline(component: &Arc<str>, bindings: &[InterceptorBinding]) -> InterceptorPipeline {
    let mut chain = OrderedChain::new();
    chain.add(context_unit(component), priority::ring::CONTEXT_PROPAGATION);
    add_band(&mut chain, priority::ring::USER, sorted_band(bindings));
    InterceptorPipeline::new(chain.into_sorted())
}

fn client_lifecycle_pipeline(
    component: &Arc<str>,
    bindings: &[InterceptorBinding],
    user_band: i32,
) -> InterceptorPipeline {
    let mut chain = OrderedChain::new();
    chain.add(
        context_unit(component),
        priority::construction::CONTEXT_PROPAGATION,
    );
    add_band(&mut chain, user_band, sorted_band(bindings));
    chain.add(
        named("terminal", LifecycleTerminalUnit),
        priority::construction::TERMINAL,
    );
    InterceptorPipeline::new(chain.into_sorted())
}
