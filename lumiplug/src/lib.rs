//! lumiplug - resource provider plugins for Lumi
//!
//! The host side launches provider plugins, talks to them through
//! [`ProviderClient`] and plans changes with the diff engine. The plugin side
//! registers resource kinds with a [`ResourceProvider`] and serves it with
//! [`serve`].

// Core modules
pub mod context;
pub mod error;
pub mod property;
pub mod tokens;

// Properties, schemas and planning
pub mod diff;
pub mod mapper;
pub mod marshal;
pub mod plan;
pub mod schema;

// Host side
pub mod client;
pub mod config;
pub mod host;
pub mod plugin;

// Provider side
pub mod provider;
pub mod resource;

// Wire protocol and server
pub mod grpc;
pub mod logging;
pub mod proto;
pub mod server;

// Re-exports for convenience
pub use client::ProviderClient;
pub use config::HostConfig;
pub use context::{Context, Interrupted};
pub use diff::{ArrayDiff, ObjectDiff, ValueDiff};
pub use error::{
    CallSite, LumiplugError, MutationError, Operation, ProviderError, Result,
};
pub use host::PluginHost;
pub use logging::{init_logging, LogLevel};
pub use mapper::{decode, encode, DecodeError, FieldError};
pub use marshal::{MarshalOptions, NoReferences, ReferenceResolver, ReferenceTable};
pub use plan::{ChangeAction, ChangePlan, ReplacePlan};
pub use plugin::Plugin;
pub use property::{CheckFailure, Id, PropertyKey, PropertyMap, PropertyValue, ResourceState};
pub use provider::ResourceProvider;
pub use resource::{Inspection, ResourceOps};
pub use schema::{FieldKind, FieldSchema, ResourceSchema, SchemaRegistry};
pub use server::{serve, serve_default, serve_on, ServerConfig};
pub use tokens::{Package, Type, Urn};

// Convenience macro for main function
#[macro_export]
macro_rules! serve_provider {
    ($provider:expr) => {
        #[tokio::main]
        async fn main() -> $crate::Result<()> {
            $crate::serve($provider, $crate::ServerConfig::default()).await
        }
    };
    ($provider:expr, $config:expr) => {
        #[tokio::main]
        async fn main() -> $crate::Result<()> {
            $crate::serve($provider, $config).await
        }
    };
}
