//! Fulcrum Load Balance Library
//!
//! This library provides client-side load balancing for the Fulcrum system including:
//! - Health probes (TCP connect, HTTP GET, fixed)
//! - Probe strategies (sequential, thread pool, process pool, cooperative)
//! - Server selection policies
//! - The balancer that keeps an atomically swapped snapshot of alive servers

pub mod loadbalance;

// Re-export commonly used types
pub use loadbalance::{
    build_probe, AlwaysAliveProbe, Balancer, BalancerBuilder, BalancerFactory, BalancerState,
    BalancerStats, CooperativeStrategy, FixedProbe, HealthProbe, HttpProbe, ProbeReport,
    ProbeStrategy, ProcessPoolStrategy, RandomPolicy, RefreshHandle, RoundRobinPolicy,
    SelectionPolicy, SequentialStrategy, Snapshot, TcpProbe, ThreadPoolStrategy,
};
