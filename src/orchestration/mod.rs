//! Orchestration layer for multi-region publishing
//!
//! Region publishers run one workflow per region; the orchestrator fans
//! them out concurrently and collects every outcome in the aggregator.

pub mod aggregator;
pub mod orchestrator;
pub mod region_publisher;

pub use aggregator::ResultAggregator;
pub use orchestrator::{DispatchPolicy, Orchestrator, RunSummary};
pub use region_publisher::{IsolatedRegionPublisher, StandardRegionPublisher, publisher_for};
