//! The three-ring view model.
//!
//! A client-visible view links a proxy invocation through independent
//! client, view, and component pipelines to the target instance.

pub mod assembly;
pub mod proxy;

pub use assembly::{ProxySequence, ViewAssembly};
pub use proxy::ClientProxy;
