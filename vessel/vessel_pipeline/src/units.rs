//! Container-provided interceptor units.
//!
//! These are the units the assembler weaves around user contributions:
//! ambient-context propagation, instantiation, resource injection and
//! release, lifecycle callbacks, and the two terminal units. Each unit
//! that acquires something during construction releases it again if the
//! rest of the chain fails, so a partial construction unwinds in reverse
//! order of acquisition.

use log::warn;
use serde_json::Value;
use std::sync::Arc;

use vessel_core::error::{InvocationError, Result};

use crate::context::{
    ambient_component_key, instance_key, ContextKey, InstanceContext, InvocationContext,
};
use crate::descriptor::{InstanceFactory, LifecycleCallback, ResourceInjection, TargetOperation};
use crate::interceptor::{Interceptor, InterceptorUnit, Next};

/// Propagates ambient execution context into every invocation.
///
/// Unconditionally the first unit of every assembled chain.
pub struct ContextPropagationUnit {
    component: Arc<str>,
}

impl ContextPropagationUnit {
    /// Create a propagation unit for the named component.
    pub fn new(component: Arc<str>) -> Self {
        Self { component }
    }
}

impl InterceptorUnit for ContextPropagationUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(ContextPropagationInterceptor {
            component: Arc::clone(&self.component),
        }))
    }
}

struct ContextPropagationInterceptor {
    component: Arc<str>,
}

impl Interceptor for ContextPropagationInterceptor {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value> {
        ctx.put(ambient_component_key(), self.component.to_string());
        next.proceed(ctx)
    }
}

/// Creates the primary instance and installs it under the instance key.
pub struct InstantiationUnit {
    factory: InstanceFactory,
}

impl InstantiationUnit {
    /// Create an instantiation unit from the component's factory.
    pub fn new(factory: InstanceFactory) -> Self {
        Self { factory }
    }
}

impl InterceptorUnit for InstantiationUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(InstantiationInterceptor {
            factory: Arc::clone(&self.factory),
        }))
    }
}

struct InstantiationInterceptor {
    factory: InstanceFactory,
}

impl Interceptor for InstantiationInterceptor {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value> {
        let value = (self.factory)()?;
        let op = ctx.operation().clone();
        let instance = ctx
            .instance_mut()
            .ok_or_else(|| InvocationError::MissingInstance(op))?;
        instance.install(instance_key(), value, drop);

        match next.proceed(ctx) {
            Ok(result) => Ok(result),
            Err(err) => {
                if let Some(instance) = ctx.instance_mut() {
                    instance.release(&instance_key());
                }
                Err(err)
            }
        }
    }
}

/// Acquires one injected resource and installs it with its release action.
pub struct InjectionUnit {
    injection: ResourceInjection,
}

impl InjectionUnit {
    /// Create an injection unit for one declared injection.
    pub fn new(injection: ResourceInjection) -> Self {
        Self { injection }
    }
}

impl InterceptorUnit for InjectionUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(InjectionInterceptor {
            injection: self.injection.clone(),
        }))
    }
}

struct InjectionInterceptor {
    injection: ResourceInjection,
}

impl Interceptor for InjectionInterceptor {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value> {
        let value = (self.injection.provider)()?;
        let op = ctx.operation().clone();
        let instance = ctx
            .instance_mut()
            .ok_or_else(|| InvocationError::MissingInstance(op))?;
        let release = self.injection.release.clone();
        instance.install(self.injection.key.clone(), value, move |holder| match release {
            Some(release) => release(holder),
            None => drop(holder),
        });

        match next.proceed(ctx) {
            Ok(result) => Ok(result),
            Err(err) => {
                if let Some(instance) = ctx.instance_mut() {
                    instance.release(&self.injection.key);
                }
                Err(err)
            }
        }
    }
}

/// Releases one injected resource during destruction.
pub struct UninjectionUnit {
    key: ContextKey,
}

impl UninjectionUnit {
    /// Create a release unit for one injected slot.
    pub fn new(key: ContextKey) -> Self {
        Self { key }
    }
}

impl InterceptorUnit for UninjectionUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(UninjectionInterceptor {
            key: self.key.clone(),
        }))
    }
}

struct UninjectionInterceptor {
    key: ContextKey,
}

impl Interceptor for UninjectionInterceptor {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value> {
        if let Some(instance) = ctx.instance_mut() {
            instance.release(&self.key);
        }
        next.proceed(ctx)
    }
}

/// Releases the primary instance during destruction.
pub struct InstanceReleaseUnit;

impl InterceptorUnit for InstanceReleaseUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(InstanceReleaseInterceptor))
    }
}

struct InstanceReleaseInterceptor;

impl Interceptor for InstanceReleaseInterceptor {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value> {
        if let Some(instance) = ctx.instance_mut() {
            instance.release(&instance_key());
        }
        next.proceed(ctx)
    }
}

/// Runs one pre-resolved lifecycle callback on the primary instance, then
/// proceeds.
///
/// A construction-phase callback failure aborts the chain. A
/// destruction-phase unit is created with [`swallowing`] instead: the
/// failure is logged and the chain proceeds, so resource release is never
/// skipped because of a callback.
///
/// [`swallowing`]: LifecycleCallbackUnit::swallowing
pub struct LifecycleCallbackUnit {
    callback: LifecycleCallback,
    swallow_errors: bool,
}

impl LifecycleCallbackUnit {
    /// Wrap a resolved callback as a fail-fast unit.
    pub fn new(callback: LifecycleCallback) -> Self {
        Self {
            callback,
            swallow_errors: false,
        }
    }

    /// Wrap a resolved callback as a unit whose failures are logged and
    /// swallowed.
    pub fn swallowing(callback: LifecycleCallback) -> Self {
        Self {
            callback,
            swallow_errors: true,
        }
    }
}

impl InterceptorUnit for LifecycleCallbackUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(LifecycleCallbackInterceptor {
            callback: Arc::clone(&self.callback),
            swallow_errors: self.swallow_errors,
        }))
    }
}

struct LifecycleCallbackInterceptor {
    callback: LifecycleCallback,
    swallow_errors: bool,
}

impl Interceptor for LifecycleCallbackInterceptor {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, next: Next<'_>) -> Result<Value> {
        let op = ctx.operation().clone();
        {
            let instance = ctx
                .instance_mut()
                .ok_or_else(|| InvocationError::MissingInstance(op.clone()))?;
            let holder = instance
                .get_raw_mut(&instance_key())
                .ok_or(InvocationError::MissingInstance(op.clone()))?;
            if let Err(err) = (self.callback)(holder) {
                if self.swallow_errors {
                    warn!("lifecycle callback failed during {}: {}", op, err);
                } else {
                    return Err(err);
                }
            }
        }
        next.proceed(ctx)
    }
}

/// Terminal for lifecycle phases: stop and return success.
pub struct LifecycleTerminalUnit;

impl InterceptorUnit for LifecycleTerminalUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(LifecycleTerminalInterceptor))
    }
}

struct LifecycleTerminalInterceptor;

impl Interceptor for LifecycleTerminalInterceptor {
    fn invoke(&self, _ctx: &mut InvocationContext<'_>, _next: Next<'_>) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Terminal for around-invoke chains: call the resolved target operation
/// on the primary instance.
pub struct TargetCallUnit {
    target: TargetOperation,
}

impl TargetCallUnit {
    /// Create a terminal for one resolved operation.
    pub fn new(target: TargetOperation) -> Self {
        Self { target }
    }
}

impl InterceptorUnit for TargetCallUnit {
    fn create(&self, _instance: &mut InstanceContext) -> Result<Box<dyn Interceptor>> {
        Ok(Box::new(TargetCallInterceptor {
            target: Arc::clone(&self.target),
        }))
    }
}

struct TargetCallInterceptor {
    target: TargetOperation,
}

impl Interceptor for TargetCallInterceptor {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, _next: Next<'_>) -> Result<Value> {
        let params = ctx.take_parameters();
        let op = ctx.operation().clone();
        let instance = ctx
            .instance_mut()
            .ok_or_else(|| InvocationError::MissingInstance(op.clone()))?;
        let holder = instance
            .get_raw_mut(&instance_key())
            .ok_or(InvocationError::MissingInstance(op))?;
        (self.target)(holder, params)
    }
}
