//! Fulcrum Core Library
//!
//! This library provides core functionality for the Fulcrum load balancer including:
//! - The server model shared by discovery, probing and selection
//! - Configuration management
//! - Server discovery (static lists and the Consul catalog)
//! - Error types

pub mod config;
pub mod discovery;
pub mod error;
pub mod server;

// Re-export commonly used types
pub use config::model::{
    BalancerSettings, Config, DiscoveryConfig, DiscoveryFailurePolicy, PolicyKind, ProbeConfig,
    StrategyConfig,
};
pub use discovery::{ConsulServerSource, ServerSource, StaticServerSource};
pub use error::{BalancerError, BalancerResult, DiscoveryError};
pub use server::{Server, DEFAULT_PORT};
