//! Wiring for the polylink integration platform.
//!
//! This crate provides:
//!
//! - **PlatformAdapter**: the trait every platform integration implements,
//!   registered explicitly in an [`AdapterRegistry`]
//! - **IntegrationContext**: owns the vault, gateway, bus, and webhook
//!   receiver and hands them to adapters; there are no globals
//! - **HubConfig**: strongly-typed configuration loaded via the `config`
//!   crate from files and `POLYLINK_`-prefixed environment variables
//!
//! Adapters are compiled in and registered at startup; there is no
//! runtime plugin loading.

pub mod adapter;
pub mod config;
pub mod context;
pub mod error;

pub use adapter::{
    AdapterCapability, AdapterRegistry, Operation, OperationResult, PlatformAdapter,
};
pub use config::{BackendKind, GatewaySettings, HubConfig, VaultSettings};
pub use context::IntegrationContext;
pub use error::{AdapterError, HubError};
