//! Orchestrator - Publishes one image to every configured region
//!
//! Features:
//! - One tokio task per region, no concurrency cap
//! - Each task builds its own driver set, so a bad region fails alone
//! - Waits for every task before deciding the outcome (or aborts the rest
//!   on first failure under `DispatchPolicy::FailFast`)
//! - Hands records to the manifest only when no region failed

use crate::core::config::{ImageConfiguration, RegionConfig, RunConfig};
use crate::core::error::{PublishError, RunError};
use crate::core::manifest::Manifest;
use crate::core::state_machine::{RunState, RunStateMachine};
use crate::core::traits::{DriverFactory, DriverVariant, PublishedImage};
use crate::drivers::select_variant;
use crate::orchestration::aggregator::ResultAggregator;
use crate::orchestration::region_publisher::publisher_for;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// What to do with running regions once one has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Let every region finish and report all failures
    #[default]
    WaitForAll,

    /// Abort the remaining regions after the first failure
    FailFast,
}

/// End-of-run summary, logged once
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub records: usize,
    pub elapsed_ms: i64,
}

impl RunSummary {
    fn log(&self) {
        if self.failed.is_empty() {
            info!(
                run_id = %self.run_id,
                regions = self.succeeded.len(),
                records = self.records,
                elapsed_ms = self.elapsed_ms,
                "publish run succeeded"
            );
        } else {
            error!(
                run_id = %self.run_id,
                succeeded = ?self.succeeded,
                failed = ?self.failed,
                records = self.records,
                elapsed_ms = self.elapsed_ms,
                "publish run failed"
            );
        }
    }
}

// How a region task ended; the outcome itself is in the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Published,
    Failed,
}

/// Runs the concurrent multi-region publish
pub struct Orchestrator {
    factory: Arc<dyn DriverFactory>,
    policy: DispatchPolicy,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            policy: DispatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Publish to every region and update `manifest` on success
    ///
    /// The manifest is untouched unless every region succeeded.
    pub async fn publish(
        &self,
        config: RunConfig,
        image_path: &Path,
        manifest: &mut Manifest,
    ) -> Result<Vec<PublishedImage>, RunError> {
        if !image_path.is_file() {
            return Err(RunError::SourceImage(image_path.display().to_string()));
        }

        let records = self
            .run(config.ami_regions, config.ami_configuration, image_path.to_path_buf())
            .await?;
        manifest.set_published_images(&records);

        Ok(records)
    }

    /// Run one publish per region and aggregate the outcomes
    ///
    /// Returns every record when all regions succeeded, otherwise every
    /// region error sorted by region.
    pub async fn run(
        &self,
        regions: Vec<RegionConfig>,
        image_config: ImageConfiguration,
        image_path: PathBuf,
    ) -> Result<Vec<PublishedImage>, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("publish_run", %run_id);

        self.run_inner(run_id, regions, image_config, image_path)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        regions: Vec<RegionConfig>,
        image_config: ImageConfiguration,
        image_path: PathBuf,
    ) -> Result<Vec<PublishedImage>, RunError> {
        let mut state = RunStateMachine::new();
        let aggregator = Arc::new(ResultAggregator::new());
        let image_config = Arc::new(image_config);
        let image_path: Arc<Path> = Arc::from(image_path);

        state.transition(RunState::Dispatching)?;
        info!(regions = regions.len(), policy = ?self.policy, "dispatching region publishers");

        let mut tasks = JoinSet::new();
        let mut task_regions = HashMap::with_capacity(regions.len());
        for region in regions {
            let variant = select_variant(&region);
            let span = info_span!("region", region = %region.name, %variant);
            let name = region.name.clone();

            let handle = tasks.spawn(
                publish_region(
                    region,
                    variant,
                    Arc::clone(&self.factory),
                    Arc::clone(&image_config),
                    Arc::clone(&image_path),
                    Arc::clone(&aggregator),
                )
                .instrument(span),
            );
            task_regions.insert(handle.id(), name);
        }
        let dispatched = task_regions.len();

        state.transition(RunState::Awaiting)?;
        let mut aborting = false;
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, TaskOutcome::Failed))
                    if self.policy == DispatchPolicy::FailFast && !aborting =>
                {
                    warn!(remaining = tasks.len(), "region failed, aborting remaining regions");
                    tasks.abort_all();
                    aborting = true;
                }
                Ok(_) => {}
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    let region = task_regions.get(&e.id()).cloned().unwrap_or_default();
                    aggregator.record_failure(PublishError::Cancelled { region });
                }
            }
        }

        let recorded = aggregator.outcome_count();
        if recorded != dispatched {
            return Err(RunError::AggregationViolation {
                expected: dispatched,
                recorded,
            });
        }

        let records = aggregator.all_records();
        let mut errors = aggregator.all_errors();
        errors.sort_by(|a, b| a.region().cmp(b.region()));

        let failed: BTreeSet<String> = errors.iter().map(|e| e.region().to_string()).collect();
        let succeeded: BTreeSet<String> = task_regions
            .into_values()
            .filter(|region| !failed.contains(region))
            .collect();

        let terminal = if aggregator.has_errors() {
            RunState::Failed
        } else {
            RunState::Succeeded
        };
        state.transition(terminal)?;
        debug!(history = %state.history(), "run state transitions");

        RunSummary {
            run_id,
            succeeded: succeeded.into_iter().collect(),
            failed: failed.into_iter().collect(),
            records: records.len(),
            elapsed_ms: state.elapsed_ms(),
        }
        .log();

        if errors.is_empty() {
            Ok(records)
        } else {
            Err(RunError::RegionsFailed { errors })
        }
    }
}

// Aggregator writes are the last thing a task does and never await, so an
// abort lands either before the write or not at all.
async fn publish_region(
    region: RegionConfig,
    variant: DriverVariant,
    factory: Arc<dyn DriverFactory>,
    image_config: Arc<ImageConfiguration>,
    image_path: Arc<Path>,
    aggregator: Arc<ResultAggregator>,
) -> TaskOutcome {
    let result: Result<Vec<PublishedImage>, PublishError> = async {
        let drivers =
            factory
                .build(&region, variant)
                .map_err(|e| PublishError::DriverConstruction {
                    region: region.name.clone(),
                    message: e.to_string(),
                })?;

        publisher_for(variant, &region.name, image_config)
            .publish(drivers.as_ref(), &image_path)
            .await
    }
    .await;

    match result {
        Ok(records) => {
            info!(images = records.len(), "region published");
            aggregator.record_success(records);
            TaskOutcome::Published
        }
        Err(e) => {
            error!(code = e.code(), "{}", e);
            aggregator.record_failure(e);
            TaskOutcome::Failed
        }
    }
}
