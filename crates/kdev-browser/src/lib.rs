//! Cluster resource browsing for kdev
//!
//! This crate provides the selection flow over contexts, namespaces and pods,
//! the background dispatcher that keeps kubectl calls off the interactive
//! thread, and the abbreviation matcher used to jump through long lists.

mod controller;
mod dispatcher;
mod filter;

pub use controller::{BrowserState, Completion, Controller, Operation, PodLogs, Presenter, Selection};
pub use dispatcher::{Dispatcher, TaskHandle};
pub use filter::{first_match, matches};

// Re-export types that are used in our public API
pub use kdev_cache::ResourceCache;
pub use kdev_kubectl::{InteractiveCommand, Kubectl, PortForward, ToolLocator};
pub use kdev_types::{
    CacheKey, CopyDirection, KdevError, PodDescription, PortMapping, Result,
};
