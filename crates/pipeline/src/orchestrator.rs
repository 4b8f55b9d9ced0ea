//! Pipeline orchestrator.
//!
//! `INGEST -> CLUSTER -> (per cluster: MINE -> DERIVE) -> AGGREGATE -> EXPORT`
//!
//! Each cluster round is a pure function of its sub-basket and returns its
//! own rules; the orchestrator folds the rounds together. Aggregation keys
//! on `(cluster, antecedent)`, so the fold order does not affect the result
//! and rounds may run on the rayon pool.

use coborrow_core::config::PipelineConfig;
use coborrow_core::types::{AggregatedRule, ClusterAssignment, ClusterId, Event, RuleSetDocument, TaggedRule};
use coborrow_core::{BasketMatrix, CoborrowError, CoborrowResult, Phase};
use coborrow_mining::{aggregate, ItemsetMiner, RuleDeriver};
use coborrow_segmentation::SegmentationEngine;
use coborrow_store::{EventSource, ResultSink};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::report::{ClusterSkip, ExportStatus, PhaseCounts, RunMode, RunReport};

/// Output of one successful mining round.
struct RoundOutput {
    itemsets: usize,
    rules: Vec<TaggedRule>,
}

type RoundResult = (Option<ClusterId>, CoborrowResult<RoundOutput>);

pub struct Pipeline {
    config: PipelineConfig,
    segmentation: SegmentationEngine,
    miner: ItemsetMiner,
    deriver: RuleDeriver,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let segmentation = SegmentationEngine::from_config(&config);
        let miner = ItemsetMiner::new(config.min_support).with_max_len(config.max_len);
        let deriver = RuleDeriver::new(config.min_confidence);
        Self {
            config,
            segmentation,
            miner,
            deriver,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run in the mode the configuration selects.
    pub fn run(&self, source: &dyn EventSource, sink: &dyn ResultSink) -> CoborrowResult<RunReport> {
        if self.config.segmented {
            self.run_segmented(source, sink)
        } else {
            self.run_unsegmented(source, sink)
        }
    }

    /// Cluster entities, then mine each cluster on its own.
    ///
    /// `DataUnavailable` and segmentation failures abort the run before
    /// anything is exported. Clusters without rules are recorded as skips.
    pub fn run_segmented(&self, source: &dyn EventSource, sink: &dyn ResultSink) -> CoborrowResult<RunReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        self.config.validate()?;

        let events = ingest(source)?;
        let basket = BasketMatrix::from_events(&events);
        let mut counts = PhaseCounts {
            events: events.len(),
            transactions: basket.len(),
            entities: basket.entities().len(),
            ..PhaseCounts::default()
        };

        let assignment = self.segmentation.segment(&basket)?;
        let partitions: Vec<(Option<ClusterId>, BasketMatrix)> = basket
            .partition(&assignment)
            .into_iter()
            .map(|(cluster_id, sub)| (Some(cluster_id), sub))
            .collect();

        let (rules, skipped) = self.mine_rounds(partitions, &mut counts)?;

        let export = self.export(sink, run_id, Some(&assignment), &rules);
        let report = RunReport {
            run_id,
            mode: RunMode::Segmented,
            counts,
            assignment: Some(assignment),
            rules,
            skipped,
            export,
        };
        log_finished(&report, start);
        Ok(report)
    }

    /// Mine the whole basket once. Rules carry no cluster id.
    pub fn run_unsegmented(&self, source: &dyn EventSource, sink: &dyn ResultSink) -> CoborrowResult<RunReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        self.config.validate()?;

        let events = ingest(source)?;
        let basket = BasketMatrix::from_events(&events);
        let mut counts = PhaseCounts {
            events: events.len(),
            transactions: basket.len(),
            entities: basket.entities().len(),
            ..PhaseCounts::default()
        };

        let (rules, skipped) = self.mine_rounds(vec![(None, basket)], &mut counts)?;

        let export = self.export(sink, run_id, None, &rules);
        let report = RunReport {
            run_id,
            mode: RunMode::Unsegmented,
            counts,
            assignment: None,
            rules,
            skipped,
            export,
        };
        log_finished(&report, start);
        Ok(report)
    }

    /// Mine with the cluster assignment already held by the source. Only the
    /// rule set is replaced; the stored assignment is left untouched.
    pub fn run_from_assignments(
        &self,
        source: &dyn EventSource,
        sink: &dyn ResultSink,
    ) -> CoborrowResult<RunReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        self.config.validate()?;

        let clustered = source.fetch_clustered_events()?;
        if clustered.is_empty() {
            return Err(CoborrowError::DataUnavailable {
                phase: Phase::Ingest,
                detail: "no clustered events".to_string(),
            });
        }

        let mut by_cluster: BTreeMap<ClusterId, Vec<Event>> = BTreeMap::new();
        for event in &clustered {
            by_cluster.entry(event.cluster_id).or_default().push(event.event());
        }

        let mut counts = PhaseCounts {
            events: clustered.len(),
            ..PhaseCounts::default()
        };
        let partitions: Vec<(Option<ClusterId>, BasketMatrix)> = by_cluster
            .into_iter()
            .map(|(cluster_id, events)| (Some(cluster_id), BasketMatrix::from_events(&events)))
            .collect();
        for (_, sub) in &partitions {
            counts.transactions += sub.len();
            counts.entities += sub.entities().len();
        }

        let (rules, skipped) = self.mine_rounds(partitions, &mut counts)?;

        let export = self.export(sink, run_id, None, &rules);
        let report = RunReport {
            run_id,
            mode: RunMode::FromAssignments,
            counts,
            assignment: None,
            rules,
            skipped,
            export,
        };
        log_finished(&report, start);
        Ok(report)
    }

    /// MINE and DERIVE for one cluster. Pure: no shared state is touched.
    fn mine_round(&self, cluster_id: Option<ClusterId>, basket: &BasketMatrix) -> CoborrowResult<RoundOutput> {
        let itemsets = self.miner.mine(basket)?;
        if itemsets.is_empty() {
            return Err(CoborrowError::NoFrequentPatterns {
                cluster_id,
                min_support: self.miner.min_support(),
            });
        }

        let rules = self.deriver.derive(basket, &itemsets)?;
        if rules.is_empty() {
            return Err(CoborrowError::NoQualifyingRules {
                cluster_id,
                min_confidence: self.deriver.min_confidence(),
            });
        }

        Ok(RoundOutput {
            itemsets: itemsets.len(),
            rules: rules
                .into_iter()
                .map(|rule| TaggedRule { cluster_id, rule })
                .collect(),
        })
    }

    /// Run every round, fold the successes and record the local failures.
    /// Any other failure aborts the run.
    fn mine_rounds(
        &self,
        partitions: Vec<(Option<ClusterId>, BasketMatrix)>,
        counts: &mut PhaseCounts,
    ) -> CoborrowResult<(Vec<AggregatedRule>, Vec<ClusterSkip>)> {
        let outcomes: Vec<RoundResult> = if self.config.parallel {
            partitions
                .into_par_iter()
                .map(|(cluster_id, sub)| (cluster_id, self.mine_round(cluster_id, &sub)))
                .collect()
        } else {
            partitions
                .into_iter()
                .map(|(cluster_id, sub)| (cluster_id, self.mine_round(cluster_id, &sub)))
                .collect()
        };

        let mut tagged = Vec::new();
        let mut skipped = Vec::new();
        for (cluster_id, outcome) in outcomes {
            match outcome {
                Ok(mut round) => {
                    counts.clusters_mined += 1;
                    counts.itemsets += round.itemsets;
                    tagged.append(&mut round.rules);
                }
                Err(e) => match ClusterSkip::from_error(&e) {
                    Some(skip) => {
                        warn!(cluster_id = ?cluster_id, error = %e, "Cluster skipped");
                        metrics::counter!("coborrow.clusters.skipped").increment(1);
                        skipped.push(skip);
                    }
                    None => return Err(e),
                },
            }
        }

        counts.rules_derived = tagged.len();
        let rules = aggregate(&tagged);
        counts.rules_aggregated = rules.len();
        Ok((rules, skipped))
    }

    /// Replace the stored rule set, and the assignment when given, in one
    /// write. A failed write is reported, never raised; results stay in
    /// memory and the store keeps the previous run's results.
    fn export(
        &self,
        sink: &dyn ResultSink,
        run_id: Uuid,
        assignment: Option<&ClusterAssignment>,
        rules: &[AggregatedRule],
    ) -> ExportStatus {
        let document = RuleSetDocument::new(run_id, self.config.thresholds(), rules);
        match sink.replace_results(assignment, &document) {
            Ok(()) => ExportStatus::Written,
            Err(e) => {
                error!(run_id = %run_id, phase = %Phase::Export, error = %e, "Export failed");
                metrics::counter!("coborrow.export.failures").increment(1);
                ExportStatus::Failed { reason: e.to_string() }
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

fn ingest(source: &dyn EventSource) -> CoborrowResult<Vec<Event>> {
    let events = source.fetch_events()?;
    if events.is_empty() {
        return Err(CoborrowError::DataUnavailable {
            phase: Phase::Ingest,
            detail: "no completed borrow events".to_string(),
        });
    }
    Ok(events)
}

fn log_finished(report: &RunReport, start: Instant) {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    metrics::histogram!("coborrow.run.duration_ms").record(elapsed_ms as f64);
    info!(
        run_id = %report.run_id,
        mode = ?report.mode,
        events = report.counts.events,
        clusters_mined = report.counts.clusters_mined,
        skipped = report.skipped.len(),
        rules = report.rules.len(),
        exported = report.export.is_written(),
        elapsed_ms,
        "Pipeline run finished"
    );
}
