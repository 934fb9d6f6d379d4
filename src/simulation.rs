// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Interactive Simulation

use wasm_bindgen::prelude::*;

use crate::geometry::{construct, AxialOverlapChecker, DetectorLayout, GeometryParams};
use crate::lifecycle::{EventController, EventState, LifecycleError};
use crate::run::RunError;
use crate::sink::{OutputTarget, RecordingSink};
use crate::types::*;

// ─── CaloSimulation struct ───────────────────────────────────────────────────

/// Event-at-a-time driver for an external transport (a browser front end,
/// a replay tool). Tables stay in memory; nothing is flushed to disk.
#[wasm_bindgen]
pub struct CaloSimulation {
    pub(crate) layout: DetectorLayout,
    pub(crate) controller: EventController,
    pub(crate) sink: RecordingSink,
    pub(crate) next_event: EventId,
    pub(crate) records: Vec<EventRecord>,
}

// ─── Internal Logic (Testable, pure Rust) ────────────────────────────────────

impl CaloSimulation {
    pub fn build(params: &GeometryParams) -> Result<Self, RunError> {
        let layout = construct(params, &mut AxialOverlapChecker::new())?;
        let mut controller = EventController::new(&layout);
        let mut sink = RecordingSink::new(OutputTarget::default());
        controller.declare_tables(&mut sink)?;
        Ok(Self {
            layout,
            controller,
            sink,
            next_event: 0,
            records: Vec::new(),
        })
    }

    /// Open the next event with a primary of the given species and energy.
    pub fn begin_event_core(
        &mut self,
        particle: ParticleCode,
        energy: f64,
    ) -> Result<EventId, LifecycleError> {
        let event_id = self.next_event;
        let primary = PrimaryVertex {
            particle,
            particle_name: String::new(),
            energy,
            position: ThreeVector::default(),
            direction: ThreeVector::new(0.0, 0.0, 1.0),
        };
        self.controller.begin_event(event_id, &primary)?;
        self.next_event += 1;
        Ok(event_id)
    }

    /// Report one hit into the open event.
    pub fn deposit_core(
        &mut self,
        volume: u32,
        energy: f64,
        position: ThreeVector,
    ) -> Result<(), LifecycleError> {
        let event_id = match self.controller.state() {
            EventState::Open { event_id, .. } => *event_id,
            EventState::Idle => return Err(LifecycleError::NoOpenEvent),
        };
        let hit = HitReport {
            volume: VolumeId(volume),
            energy_deposit: energy,
            position,
            event_id,
        };
        self.controller.record_hit(&hit, &mut self.sink)
    }

    pub fn end_event_core(&mut self) -> Result<EventRecord, LifecycleError> {
        let record = self.controller.end_event(&mut self.sink)?;
        self.records.push(record.clone());
        Ok(record)
    }

    pub fn layout(&self) -> &DetectorLayout {
        &self.layout
    }

    pub fn sink(&self) -> &RecordingSink {
        &self.sink
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }
}
