pub mod balancer;
pub mod factory;
pub mod policy;
pub mod probe;
pub mod process;
pub mod snapshot;
pub mod strategy;

#[cfg(test)]
mod balancer_tests;

pub use balancer::{Balancer, BalancerBuilder, BalancerState, BalancerStats, RefreshHandle};
pub use factory::BalancerFactory;
pub use policy::{RandomPolicy, RoundRobinPolicy, SelectionPolicy};
pub use probe::{build_probe, AlwaysAliveProbe, FixedProbe, HealthProbe, HttpProbe, TcpProbe};
pub use process::{ProbeJob, ProbeTarget, ProbeVerdict, ProcessPoolStrategy};
pub use snapshot::{Snapshot, SnapshotCell};
pub use strategy::{
    CooperativeStrategy, ProbeReport, ProbeStrategy, SequentialStrategy, ThreadPoolStrategy,
};
