//! Parallel processing of independent targets.
//!
//! Every target owns its reduction graph, so targets never share mutable
//! state; only the mission, the detrender and the renderer are shared behind
//! `Arc`. The work itself is CPU bound and runs on tokio's blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::detrend::Detrender;
use crate::mission::Mission;
use crate::models::{Season, TargetId};
use crate::report::ReportRenderer;
use crate::target::Target;

/// Settings shared by every target of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub report_dir: PathBuf,
    /// Targets processed at the same time. Values below 1 count as 1.
    pub max_concurrency: usize,
    pub labels: bool,
    /// Season requested for every target; `None` lets the mission choose.
    pub season: Option<Season>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl BatchOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            report_dir: config.paths.report_dir.clone(),
            max_concurrency: config.batch.max_concurrency,
            labels: config.report.labels,
            season: None,
        }
    }

    pub fn with_season(mut self, season: Season) -> Self {
        self.season = Some(season);
        self
    }
}

/// Result of a target that went through every stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSuccess {
    pub report: PathBuf,
    pub scatter_ppm: Option<f64>,
    pub season: Option<Season>,
}

/// What happened to one requested target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub target: TargetId,
    pub display_id: String,
    /// Failures carry the full error chain as text.
    pub result: Result<BatchSuccess, String>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    fn failed(target: TargetId, display_id: String, message: impl Into<String>) -> Self {
        Self {
            target,
            display_id,
            result: Err(message.into()),
        }
    }
}

/// Run the full pipeline for every id.
///
/// # Arguments
/// * `mission` - Mission shared by all targets
/// * `ids` - Targets to process; duplicates are processed twice
/// * `detrender` - Model fitted to every target
/// * `renderer` - Report backend
/// * `options` - Output directory, concurrency and per-target settings
///
/// # Returns
/// One outcome per id, in input order. A failing target never stops the
/// others.
pub async fn process_batch<M, D, R, I>(
    mission: Arc<M>,
    ids: I,
    detrender: Arc<D>,
    renderer: Arc<R>,
    options: &BatchOptions,
) -> Vec<BatchOutcome>
where
    M: Mission + 'static,
    D: Detrender + Send + Sync + 'static,
    R: ReportRenderer + Send + Sync + 'static,
    I: IntoIterator,
    I::Item: Into<TargetId>,
{
    let ids: Vec<TargetId> = ids.into_iter().map(Into::into).collect();
    let limit = options.max_concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    // Blocking-pool threads do not inherit the caller's scoped subscriber
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());

    info!(
        mission = mission.name(),
        targets = ids.len(),
        max_concurrency = limit,
        "Starting batch"
    );

    let mut set = JoinSet::new();
    for (index, id) in ids.iter().cloned().enumerate() {
        let mission = Arc::clone(&mission);
        let detrender = Arc::clone(&detrender);
        let renderer = Arc::clone(&renderer);
        let semaphore = Arc::clone(&semaphore);
        let dispatch = dispatch.clone();
        let options = options.clone();

        set.spawn(async move {
            let display_id = mission.format_identifier(&id);
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (index, BatchOutcome::failed(id, display_id, e.to_string())),
            };

            let worker = tokio::task::spawn_blocking({
                let id = id.clone();
                move || {
                    tracing::dispatcher::with_default(&dispatch, || {
                        run_one(mission, id, detrender.as_ref(), renderer.as_ref(), &options)
                    })
                }
            })
            .await;

            let result = match worker {
                Ok(Ok(success)) => Ok(success),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(e) => Err(format!("Worker task failed: {}", e)),
            };
            (
                index,
                BatchOutcome {
                    target: id,
                    display_id,
                    result,
                },
            )
        });
    }

    let mut slots: Vec<Option<BatchOutcome>> = vec![None; ids.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => warn!(error = %e, "Batch task did not complete"),
        }
    }

    let outcomes: Vec<BatchOutcome> = slots
        .into_iter()
        .zip(ids)
        .map(|(slot, id)| {
            slot.unwrap_or_else(|| {
                let display_id = mission.format_identifier(&id);
                BatchOutcome::failed(id, display_id, "Batch task did not complete")
            })
        })
        .collect();

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    info!(
        succeeded,
        failed = outcomes.len() - succeeded,
        "Batch finished"
    );
    outcomes
}

fn run_one<M, D, R>(
    mission: Arc<M>,
    id: TargetId,
    detrender: &D,
    renderer: &R,
    options: &BatchOptions,
) -> anyhow::Result<BatchSuccess>
where
    M: Mission,
    D: Detrender + ?Sized,
    R: ReportRenderer + ?Sized,
{
    let mut target = Target::new(mission, id).with_labels(options.labels);
    if let Some(season) = options.season {
        target = target.with_season(season);
    }

    let report = target
        .run(detrender, renderer, &options.report_dir)
        .with_context(|| format!("Processing {} stopped at {}", target.display_id(), target.state()))?;

    let scatter_ppm = target.lightcurve().and_then(|lc| lc.scatter_ppm());
    debug!(target_id = %target.id(), report = %report.display(), "Target done");
    Ok(BatchSuccess {
        report,
        scatter_ppm,
        season: target.season(),
    })
}
