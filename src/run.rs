// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Run Controller

//! Owns one run: geometry, event controller and recording sink.
//!
//! The sink lives here and is lent to the event controller on every call,
//! so nothing in the crate reaches for a process-wide output manager.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::geometry::{construct, AxialOverlapChecker, DetectorLayout, GeometryError, GeometryParams};
use crate::lifecycle::{EventController, LifecycleError, ENERGY_TABLE};
use crate::sink::{OutputTarget, RecordingSink, SinkError};
use crate::source::{GunConfig, ParticleSource};
use crate::transport::TransportEngine;
use crate::types::{EventId, EventRecord};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("geometry construction failed: {0}")]
    Geometry(#[from] GeometryError),

    #[error("event processing failed: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("recording failed: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker {worker} failed: {source}")]
    Worker { worker: usize, source: Box<RunError> },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub events: u64,
    pub geometry: GeometryParams,
    pub gun: GunConfig,
    pub output: OutputTarget,
    /// Independent workers, each with its own counters and sink, merged at run end.
    pub workers: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            events: 100,
            geometry: GeometryParams::default(),
            gun: GunConfig::default(),
            output: OutputTarget::default(),
            workers: 1,
        }
    }
}

impl RunConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if !self.gun.energy.is_finite() || self.gun.energy < 0.0 {
            return Err(ConfigError::Invalid(format!("gun energy {} is not a valid energy", self.gun.energy)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerHitCount {
    pub tracker: String,
    pub hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub events: u64,
    pub hits: u64,
    pub sensitive_volumes: usize,
    pub workers: usize,
    pub tracker_hits: Vec<TrackerHitCount>,
    /// Mean deposited energy per sensitive volume, identity order.
    pub mean_layer_energy: Vec<f64>,
    pub outputs: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// RunController
// ---------------------------------------------------------------------------

pub struct RunController {
    config: RunConfig,
    layout: DetectorLayout,
    controller: EventController,
    sink: RecordingSink,
    hits: u64,
}

impl RunController {
    /// Build the geometry and declare every output table. An overlap here
    /// aborts the run before any event.
    pub fn new(config: RunConfig) -> Result<Self, RunError> {
        config.validate()?;
        let layout = construct(&config.geometry, &mut AxialOverlapChecker::new())?;
        Self::with_layout(config, layout)
    }

    fn with_layout(config: RunConfig, layout: DetectorLayout) -> Result<Self, RunError> {
        let mut controller = EventController::new(&layout);
        let mut sink = RecordingSink::new(config.output.clone());
        controller.declare_tables(&mut sink)?;
        Ok(Self { config, layout, controller, sink, hits: 0 })
    }

    pub fn layout(&self) -> &DetectorLayout {
        &self.layout
    }

    pub fn sink(&self) -> &RecordingSink {
        &self.sink
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Drive one event end to end: primary, reset, transport, readout.
    pub fn process_event<S, T>(
        &mut self,
        event_id: EventId,
        source: &mut S,
        transport: &mut T,
    ) -> Result<EventRecord, RunError>
    where
        S: ParticleSource + ?Sized,
        T: TransportEngine + ?Sized,
    {
        let primary = source.next_primary(event_id);
        self.controller.begin_event(event_id, &primary)?;

        let hits_before = self.controller.hits_seen();
        {
            let mut receiver = self.controller.receiver(&mut self.sink);
            transport.transport(event_id, &primary, &self.layout, &mut receiver)?;
        }
        self.hits += self.controller.hits_seen() - hits_before;

        Ok(self.controller.end_event(&mut self.sink)?)
    }

    pub fn run_events<S, T>(
        &mut self,
        events: Range<EventId>,
        source: &mut S,
        transport: &mut T,
    ) -> Result<(), RunError>
    where
        S: ParticleSource + ?Sized,
        T: TransportEngine + ?Sized,
    {
        for event_id in events {
            self.process_event(event_id, source, transport)?;
        }
        Ok(())
    }

    /// Process every configured event, then flush.
    pub fn run<S, T>(mut self, source: &mut S, transport: &mut T) -> Result<RunSummary, RunError>
    where
        S: ParticleSource + ?Sized,
        T: TransportEngine + ?Sized,
    {
        if self.config.events == 0 {
            log::warn!("run configured with zero events; only table headers will be written");
        }
        log::info!("starting run: {} events", self.config.events);
        self.run_events(0..self.config.events, source, transport)?;
        self.finish(1)
    }

    fn finish(mut self, workers: usize) -> Result<RunSummary, RunError> {
        let outputs = self.sink.flush_all()?;
        let summary = summarize(&self.layout, &self.sink, self.hits, workers, outputs);
        log::info!(
            "run complete: {} events, {} hits, {} output file(s)",
            summary.events,
            summary.hits,
            summary.outputs.len()
        );
        Ok(summary)
    }

    /// Run the configured events on `config.workers` independent workers.
    ///
    /// Each worker gets a contiguous slice of the event range, its own
    /// counters and its own sink. Sinks are merged in worker order so the
    /// `Energy` rows stay in event order, then flushed once.
    /// `factory(worker, first_event)` supplies each worker's collaborators.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn run_parallel<F, S, T>(config: RunConfig, factory: F) -> Result<RunSummary, RunError>
    where
        F: Fn(usize, EventId) -> (S, T) + Sync,
        S: ParticleSource,
        T: TransportEngine,
    {
        use rayon::prelude::*;

        let mut master = RunController::new(config)?;
        let workers = master.config.workers;
        let ranges = split_events(master.config.events, workers);
        log::info!(
            "starting parallel run: {} events on {} workers",
            master.config.events,
            ranges.len()
        );

        let layout = &master.layout;
        let config = &master.config;
        let results: Vec<Result<(RecordingSink, u64), RunError>> = ranges
            .into_par_iter()
            .enumerate()
            .map(|(worker, range)| {
                let mut run = RunController::with_layout(config.clone(), layout.clone())?;
                let (mut source, mut transport) = factory(worker, range.start);
                run.run_events(range, &mut source, &mut transport)
                    .map_err(|e| RunError::Worker { worker, source: Box::new(e) })?;
                Ok((run.sink, run.hits))
            })
            .collect();

        for result in results {
            let (sink, hits) = result?;
            master.sink.merge(sink)?;
            master.hits += hits;
        }
        master.finish(workers)
    }
}

/// Split `0..events` into at most `workers` contiguous, non-empty ranges.
pub fn split_events(events: u64, workers: usize) -> Vec<Range<EventId>> {
    let workers = (workers.max(1) as u64).min(events.max(1));
    let base = events / workers;
    let extra = events % workers;
    let mut ranges = Vec::with_capacity(workers as usize);
    let mut start = 0;
    for w in 0..workers {
        let len = base + if w < extra { 1 } else { 0 };
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

fn summarize(
    layout: &DetectorLayout,
    sink: &RecordingSink,
    hits: u64,
    workers: usize,
    outputs: Vec<PathBuf>,
) -> RunSummary {
    let sensitive = layout.sensitive_count();
    let (events, mean_layer_energy) = match sink.table(ENERGY_TABLE) {
        Some(table) => {
            let n = table.row_count();
            let means = (0..sensitive)
                .map(|j| {
                    if n == 0 {
                        return 0.0;
                    }
                    table.rows.iter().map(|row| row[2 + j]).sum::<f64>() / n as f64
                })
                .collect();
            (n as u64, means)
        }
        None => (0, vec![0.0; sensitive]),
    };

    let tracker_hits = layout
        .trackers()
        .map(|l| TrackerHitCount {
            tracker: l.name.clone(),
            hits: sink
                .table(&format!("{}_x", l.name))
                .map(|t| t.row_count())
                .unwrap_or(0),
        })
        .collect();

    RunSummary {
        events,
        hits,
        sensitive_volumes: sensitive,
        workers,
        tracker_hits,
        mean_layer_energy,
        outputs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_range_contiguously() {
        let ranges = split_events(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
        assert_eq!(split_events(2, 8), vec![0..1, 1..2]);
        assert_eq!(split_events(0, 4), vec![0..0]);
        assert_eq!(split_events(5, 0), vec![0..5]);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config = RunConfig::from_json_str(r#"{ "events": 7, "geometry": { "absorber_layers": 2 } }"#)
            .expect("test: config should parse");
        assert_eq!(config.events, 7);
        assert_eq!(config.geometry.absorber_layers, 2);
        assert_eq!(config.geometry.tracker_positions, GeometryParams::default().tracker_positions);
        assert_eq!(config.gun, GunConfig::default());
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn config_rejects_zero_workers() {
        let err = RunConfig::from_json_str(r#"{ "workers": 0 }"#).expect_err("test: must fail");
        assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    }

    #[test]
    fn config_rejects_malformed_json() {
        assert!(matches!(RunConfig::from_json_str("{ events: }"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn overlap_aborts_before_any_event() {
        let mut config = RunConfig::default();
        config.geometry.tracker_positions = vec![0.0, 0.0];
        let result = RunController::new(config);
        assert!(matches!(result, Err(RunError::Geometry(GeometryError::Overlap { .. }))));
    }

    #[test]
    fn output_format_parses_lowercase() {
        let config = RunConfig::from_json_str(r#"{ "output": { "path": "out/run", "format": "csv" } }"#)
            .expect("test: config should parse");
        assert_eq!(config.output.format, crate::sink::OutputFormat::Csv);
    }
}
