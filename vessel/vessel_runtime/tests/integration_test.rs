//! End-to-end tests for the Vessel container: deploy a component with
//! interceptors, injections, lifecycle callbacks, and a view, then drive
//! it through its full lifecycle.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use vessel_core::error::Result;
use vessel_core::types::{LifecyclePhase, OperationId};
use vessel_pipeline::context::ContextKey;
use vessel_pipeline::descriptor::{
    instance_factory, typed_callback, typed_operation, ComponentDescriptor, InterceptorBinding,
    ResourceInjection, ViewDescriptor,
};
use vessel_pipeline::interceptor::{FnInterceptor, ImmediateUnit};
use vessel_pipeline::priority;
use vessel_runtime::Container;

struct Ledger {
    balance: i64,
}

fn recording(name: &'static str, band: i32, log: &Arc<Mutex<Vec<String>>>) -> InterceptorBinding {
    let log = Arc::clone(log);
    InterceptorBinding::new(
        name,
        band,
        Arc::new(ImmediateUnit::new(FnInterceptor::new(move |ctx, next| {
            log.lock().unwrap().push(name.to_string());
            next.proceed(ctx)
        }))),
    )
}

fn ledger_descriptor(log: &Arc<Mutex<Vec<String>>>) -> ComponentDescriptor {
    let mut descriptor = ComponentDescriptor::new("ledger", "A small ledger component");
    descriptor.set_instance_factory(instance_factory(|| Ledger { balance: 0 }));

    let deposit_log = Arc::clone(log);
    descriptor.add_operation(
        OperationId::new("deposit"),
        typed_operation::<Ledger, _>(move |ledger, params| {
            ledger.balance += params["amount"].as_i64().unwrap_or(0);
            deposit_log.lock().unwrap().push("deposit".to_string());
            Ok(json!({ "balance": ledger.balance }))
        }),
    );
    descriptor.add_operation(
        OperationId::new("balance"),
        typed_operation::<Ledger, _>(|ledger, _| Ok(json!({ "balance": ledger.balance }))),
    );

    // Interceptor contributions from every source
    descriptor.add_class_interceptor(recording("audit", 10, log));
    descriptor.add_default_interceptor(recording("metrics", 10, log));
    descriptor.add_operation_interceptor(
        OperationId::new("deposit"),
        recording("deposit-check", 10, log),
    );
    // The balance operation opts out of class-level interceptors
    descriptor.exclude_class_interceptors(OperationId::new("balance"));

    // An injected resource with an observable release
    let release_log = Arc::clone(log);
    descriptor.add_resource_injection(
        ResourceInjection::new(
            "journal",
            ContextKey::new("journal"),
            Arc::new(|| Ok(Box::new(Vec::<String>::new()) as vessel_pipeline::context::Holder)),
        )
        .with_release(Arc::new(move |_| {
            release_log.lock().unwrap().push("journal-released".to_string());
        })),
    );

    // Lifecycle callbacks on the instance itself
    let init_log = Arc::clone(log);
    descriptor.add_lifecycle_callback(
        LifecyclePhase::PostConstruct,
        "open-ledger",
        typed_callback::<Ledger, _>(move |_| {
            init_log.lock().unwrap().push("opened".to_string());
            Ok(())
        }),
    );
    let close_log = Arc::clone(log);
    descriptor.add_lifecycle_callback(
        LifecyclePhase::PreDestroy,
        "close-ledger",
        typed_callback::<Ledger, _>(move |_| {
            close_log.lock().unwrap().push("closed".to_string());
            Ok(())
        }),
    );

    // A remote view exposing only deposit
    let mut view = ViewDescriptor::new("remote");
    view.expose_operation(OperationId::new("deposit"));
    view.add_client_interceptor(recording("client-marshal", priority::ring::USER, log));
    view.add_view_interceptor(recording("view-auth", priority::ring::USER, log));
    view.add_client_pre_destroy(recording("client-session-close", 10, log));
    descriptor.add_view(view);

    descriptor
}

#[tokio::test]
async fn test_full_component_lifecycle() -> Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new(None).await.unwrap();

    let id = container.deploy(ledger_descriptor(&log)).await.unwrap();
    container.start_component(&id).await.unwrap();

    // Direct instance invocation: class, default, and operation-level
    // interceptors all fire for deposit
    let instance = container.components.create_instance(&id).await.unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &["opened".to_string()],
        "only the post-construct callback has run so far"
    );

    let result = instance.invoke(
        &OperationId::new("deposit"),
        json!({ "amount": 40 }),
    )?;
    assert_eq!(result, json!({ "balance": 40 }));
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &["opened", "audit", "metrics", "deposit-check", "deposit"]
    );

    // balance excludes class interceptors but keeps defaults
    log.lock().unwrap().clear();
    let result = instance.invoke(&OperationId::new("balance"), Value::Null)?;
    assert_eq!(result, json!({ "balance": 40 }));
    assert_eq!(log.lock().unwrap().as_slice(), &["metrics"]);

    // Destroying the instance runs the pre-destroy callback and releases
    // the injected journal
    log.lock().unwrap().clear();
    container
        .components
        .destroy_instance(&id, &instance)
        .await
        .unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &["closed", "journal-released"]
    );

    container.shutdown().await.unwrap();
    Ok(())
}

#[tokio::test]
async fn test_view_proxy_rings() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new(None).await.unwrap();

    let id = container.deploy(ledger_descriptor(&log)).await.unwrap();
    container.start_component(&id).await.unwrap();

    let view = container.view(&id, "remote").await.unwrap();
    let proxy = view.create_proxy_instance().unwrap();

    log.lock().unwrap().clear();
    let result = proxy
        .invoke(&OperationId::new("deposit"), json!({ "amount": 7 }))
        .unwrap();
    assert_eq!(result, json!({ "balance": 7 }));

    // Client ring, then view ring, then the component ring
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[
            "client-marshal",
            "view-auth",
            "audit",
            "metrics",
            "deposit-check",
            "deposit"
        ]
    );

    // The view only exposes deposit
    assert!(proxy.invoke(&OperationId::new("balance"), Value::Null).is_err());

    // Destroying the proxy runs the client-scoped pre-destroy pipeline and
    // tears down the bound instance
    log.lock().unwrap().clear();
    proxy.destroy().unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &["client-session-close", "closed", "journal-released"]
    );

    container.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_waits_for_start_through_manager() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new(None).await.unwrap();
    let id = container.deploy(ledger_descriptor(&log)).await.unwrap();

    let manager = Arc::clone(&container.components);
    let creator = tokio::spawn(async move { manager.create_instance(&id).await });

    // Give the creator time to park on the gate, then open it
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!creator.is_finished(), "create returned before start");

    container.start_component(&id).await.unwrap();
    let instance = creator.await.unwrap().unwrap();
    assert!(!instance.is_destroyed());

    container.stop_component(&id).await.unwrap();
    container
        .components
        .destroy_instance(&id, &instance)
        .await
        .unwrap();

    // The gate is closed; further creates fail fast instead of blocking
    assert!(container.components.create_instance(&id).await.is_err());
}
