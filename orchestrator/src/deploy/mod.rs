//! Deployment strategies

pub mod backend;
pub mod chart;
pub mod raw;
pub mod strategy;

pub use backend::{Backend, BackendOptions};
pub use chart::ChartStrategy;
pub use raw::RawManifestStrategy;
pub use strategy::{DeployError, DeploymentStrategy, StatusReport, StrategyFactory, StrategyKind};
