// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Event Lifecycle

//! Per-event sequencing: begin → hits → end.
//!
//! [`Apparatus`] owns the energy counters of one detector instance.
//! [`EventController`] drives them through each event and writes the
//! resulting rows into a [`RecordingSink`] that the caller owns and lends in.

use std::collections::HashMap;

use crate::accumulator::{AccumulatorError, EnergyCounter};
use crate::geometry::DetectorLayout;
use crate::sink::{RecordingSink, SinkError, TableHandle};
use crate::types::{EventId, EventRecord, HitReport, PrimaryVertex, ThreeVector, VolumeId};

pub const ENERGY_TABLE: &str = "Energy";
pub const POSITION_PLACEHOLDER: f64 = 0.0;
/// Largest event id the f64 `EventID` column holds exactly (2^53).
pub const MAX_EVENT_ID: EventId = 1 << 53;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("event {open} is still open, cannot begin event {requested}")]
    EventAlreadyOpen { open: EventId, requested: EventId },

    #[error("no event is open")]
    NoOpenEvent,

    #[error("hit for event {hit} while event {open} is open")]
    StaleEvent { hit: EventId, open: EventId },

    #[error("primary energy {energy} for event {event_id} is not a valid energy")]
    InvalidPrimaryEnergy { event_id: EventId, energy: f64 },

    #[error("event id {0} exceeds the exactly representable EventID range")]
    EventIdOutOfRange(EventId),

    #[error("non-finite hit position ({x}, {y}, {z}) in {volume}")]
    NonFinitePosition { volume: VolumeId, x: f64, y: f64, z: f64 },

    #[error("hit targets unknown volume {0}")]
    UnknownVolume(VolumeId),

    #[error("output tables not declared")]
    TablesNotDeclared,

    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

// ---------------------------------------------------------------------------
// Apparatus
// ---------------------------------------------------------------------------

/// Energy counters of one detector, one per sensitive volume in identity order.
#[derive(Debug, Clone)]
pub struct Apparatus {
    counters: Vec<EnergyCounter>,
    index: HashMap<VolumeId, usize>,
}

impl Apparatus {
    pub fn from_layout(layout: &DetectorLayout) -> Self {
        let mut sensitive: Vec<_> = layout
            .sensitive_layers()
            .filter_map(|l| l.identity.map(|id| (id, l.name.clone())))
            .collect();
        sensitive.sort_by_key(|(id, _)| *id);

        let counters: Vec<EnergyCounter> = sensitive
            .into_iter()
            .map(|(id, name)| EnergyCounter::new(id, name))
            .collect();
        let index = counters
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id(), i))
            .collect();
        Self { counters, index }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn counter(&self, id: VolumeId) -> Option<&EnergyCounter> {
        self.index.get(&id).map(|&i| &self.counters[i])
    }

    pub fn counters(&self) -> &[EnergyCounter] {
        &self.counters
    }

    pub fn reset_all(&mut self) {
        for counter in &mut self.counters {
            counter.reset();
        }
    }

    /// Disarm every counter; the next deposit needs a fresh reset.
    pub fn close_all(&mut self) {
        for counter in &mut self.counters {
            counter.close();
        }
    }

    pub fn deposit(&mut self, id: VolumeId, energy: f64) -> Result<(), LifecycleError> {
        let &i = self.index.get(&id).ok_or(LifecycleError::UnknownVolume(id))?;
        self.counters[i].add_deposit(energy)?;
        Ok(())
    }

    /// Current totals in identity order.
    pub fn read_all(&self) -> Vec<f64> {
        self.counters.iter().map(|c| c.read_and_keep()).collect()
    }
}

// ---------------------------------------------------------------------------
// Output schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct TrackerTables {
    x: TableHandle,
    y: TableHandle,
}

#[derive(Debug, Clone)]
struct OutputSchema {
    energy: TableHandle,
    trackers: HashMap<VolumeId, TrackerTables>,
}

/// Column names of the `Energy` table for `layers` sensitive volumes.
pub fn energy_columns(layers: usize) -> Vec<String> {
    let mut columns = vec!["GeneratedEnergy".to_string(), "ParticleCode".to_string()];
    columns.extend((1..=layers).map(|j| format!("Layer{}", j)));
    columns
}

// ---------------------------------------------------------------------------
// EventController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum EventState {
    Idle,
    Open { event_id: EventId, primary: PrimaryVertex },
}

#[derive(Debug, Clone)]
pub struct EventController {
    apparatus: Apparatus,
    tracker_ids: Vec<(VolumeId, String)>,
    schema: Option<OutputSchema>,
    state: EventState,
    events_closed: u64,
    hits_seen: u64,
}

impl EventController {
    pub fn new(layout: &DetectorLayout) -> Self {
        let tracker_ids = layout
            .trackers()
            .filter_map(|l| l.identity.map(|id| (id, l.name.clone())))
            .collect();
        Self {
            apparatus: Apparatus::from_layout(layout),
            tracker_ids,
            schema: None,
            state: EventState::Idle,
            events_closed: 0,
            hits_seen: 0,
        }
    }

    /// Declare the `Energy` table and one x/y table per tracker. Must run
    /// before the first event.
    pub fn declare_tables(&mut self, sink: &mut RecordingSink) -> Result<(), LifecycleError> {
        let energy = sink.create_table(
            ENERGY_TABLE,
            "Deposited energy",
            energy_columns(self.apparatus.len()),
        )?;

        let mut trackers = HashMap::new();
        for (id, name) in &self.tracker_ids {
            let x = sink.create_table(
                &format!("{}_x", name),
                &format!("x position on {}", name),
                ["-", "EventID", "x"],
            )?;
            let y = sink.create_table(
                &format!("{}_y", name),
                &format!("y position on {}", name),
                ["-", "EventID", "y"],
            )?;
            trackers.insert(*id, TrackerTables { x, y });
        }

        self.schema = Some(OutputSchema { energy, trackers });
        Ok(())
    }

    pub fn apparatus(&self) -> &Apparatus {
        &self.apparatus
    }

    pub fn state(&self) -> &EventState {
        &self.state
    }

    pub fn events_closed(&self) -> u64 {
        self.events_closed
    }

    pub fn hits_seen(&self) -> u64 {
        self.hits_seen
    }

    /// Open an event and zero every counter.
    pub fn begin_event(
        &mut self,
        event_id: EventId,
        primary: &PrimaryVertex,
    ) -> Result<(), LifecycleError> {
        if let EventState::Open { event_id: open, .. } = self.state {
            return Err(LifecycleError::EventAlreadyOpen { open, requested: event_id });
        }
        if event_id > MAX_EVENT_ID {
            return Err(LifecycleError::EventIdOutOfRange(event_id));
        }
        if !primary.energy.is_finite() || primary.energy < 0.0 {
            return Err(LifecycleError::InvalidPrimaryEnergy { event_id, energy: primary.energy });
        }
        self.apparatus.reset_all();
        self.state = EventState::Open { event_id, primary: primary.clone() };
        Ok(())
    }

    /// Route one hit to its counter. Tracker hits also append one row to the
    /// tracker's x table and one to its y table.
    pub fn record_hit(
        &mut self,
        hit: &HitReport,
        sink: &mut RecordingSink,
    ) -> Result<(), LifecycleError> {
        let open = match self.state {
            EventState::Open { event_id, .. } => event_id,
            EventState::Idle => return Err(LifecycleError::NoOpenEvent),
        };
        if hit.event_id != open {
            return Err(LifecycleError::StaleEvent { hit: hit.event_id, open });
        }

        if !hit.position.is_finite() {
            let ThreeVector { x, y, z } = hit.position;
            return Err(LifecycleError::NonFinitePosition { volume: hit.volume, x, y, z });
        }

        let schema = self.schema.as_ref().ok_or(LifecycleError::TablesNotDeclared)?;
        self.apparatus.deposit(hit.volume, hit.energy_deposit)?;
        self.hits_seen += 1;

        if let Some(tables) = schema.trackers.get(&hit.volume) {
            let event = hit.event_id as f64;
            sink.append_row(tables.x, &[POSITION_PLACEHOLDER, event, hit.position.x])?;
            sink.append_row(tables.y, &[POSITION_PLACEHOLDER, event, hit.position.y])?;
        }
        Ok(())
    }

    /// Close the open event: read every counter, append the `Energy` row.
    pub fn end_event(&mut self, sink: &mut RecordingSink) -> Result<EventRecord, LifecycleError> {
        let schema = self.schema.as_ref().ok_or(LifecycleError::TablesNotDeclared)?;
        let (event_id, primary) = match &self.state {
            EventState::Open { event_id, primary } => (*event_id, primary),
            EventState::Idle => return Err(LifecycleError::NoOpenEvent),
        };

        for counter in self.apparatus.counters() {
            log::debug!("{} total energy = {}", counter.name(), counter.read_and_keep());
        }

        let record = EventRecord {
            event_id,
            generated_energy: primary.energy,
            particle: primary.particle,
            layer_energies: self.apparatus.read_all(),
        };
        self.apparatus.close_all();
        sink.append_row(schema.energy, &record.to_row())?;

        self.state = EventState::Idle;
        self.events_closed += 1;
        Ok(record)
    }

    /// Adapter handed to a transport engine for the currently open event.
    pub fn receiver<'a>(&'a mut self, sink: &'a mut RecordingSink) -> ControllerReceiver<'a> {
        ControllerReceiver { controller: self, sink }
    }
}

// ---------------------------------------------------------------------------
// HitReceiver
// ---------------------------------------------------------------------------

/// Where a transport engine delivers hits.
pub trait HitReceiver {
    fn on_hit(&mut self, hit: HitReport) -> Result<(), LifecycleError>;
}

pub struct ControllerReceiver<'a> {
    controller: &'a mut EventController,
    sink: &'a mut RecordingSink,
}

impl HitReceiver for ControllerReceiver<'_> {
    fn on_hit(&mut self, hit: HitReport) -> Result<(), LifecycleError> {
        self.controller.record_hit(&hit, self.sink)
    }
}

impl HitReceiver for Vec<HitReport> {
    fn on_hit(&mut self, hit: HitReport) -> Result<(), LifecycleError> {
        self.push(hit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{build_layer_stack, GeometryParams};
    use crate::sink::OutputTarget;
    use crate::types::{ParticleCode, ThreeVector};

    fn layout(absorbers: u32) -> DetectorLayout {
        let params = GeometryParams::with_absorber_layers(absorbers);
        DetectorLayout {
            world_half_length: params.world_half_length,
            layers: build_layer_stack(&params),
            magnetic_field: params.magnetic_field,
        }
    }

    fn setup(absorbers: u32) -> (EventController, RecordingSink) {
        let mut controller = EventController::new(&layout(absorbers));
        let mut sink = RecordingSink::new(OutputTarget::default());
        controller.declare_tables(&mut sink).expect("test: declare tables");
        (controller, sink)
    }

    fn electron(energy: f64) -> PrimaryVertex {
        PrimaryVertex {
            particle: ParticleCode::Electron,
            particle_name: "e-".to_string(),
            energy,
            position: ThreeVector::default(),
            direction: ThreeVector::new(0.0, 0.0, 1.0),
        }
    }

    fn hit(volume: u32, energy: f64, event_id: EventId) -> HitReport {
        HitReport {
            volume: VolumeId(volume),
            energy_deposit: energy,
            position: ThreeVector::default(),
            event_id,
        }
    }

    #[test]
    fn declares_energy_and_tracker_tables() {
        let (_, sink) = setup(5);
        let names: Vec<&str> = sink.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Energy", "Tracker1_x", "Tracker1_y", "Tracker2_x", "Tracker2_y"]);
        let energy = sink.table(ENERGY_TABLE).expect("test: energy table");
        assert_eq!(energy.columns.len(), 10);
        assert_eq!(energy.columns[2], "Layer1");
        assert_eq!(energy.columns[9], "Layer8");
        let t = sink.table("Tracker2_y").expect("test: tracker table");
        assert_eq!(t.columns, vec!["-", "EventID", "y"]);
    }

    #[test]
    fn apparatus_maps_identities_in_order() {
        let apparatus = Apparatus::from_layout(&layout(5));
        assert_eq!(apparatus.len(), 8);
        let names: Vec<&str> = apparatus.counters().iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec!["Tracker1", "Tracker2", "Detector1", "Detector2", "Detector3", "Detector4", "Detector5", "Muon"]
        );
        assert!(apparatus.counter(VolumeId(9)).is_none());
    }

    #[test]
    fn empty_event_records_zeros() {
        let (mut c, mut sink) = setup(5);
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        let record = c.end_event(&mut sink).expect("test: end");
        assert_eq!(record.layer_energies, vec![0.0; 8]);
        assert_eq!(sink.table(ENERGY_TABLE).map(|t| t.row_count()), Some(1));
    }

    #[test]
    fn counters_reset_between_events() {
        let (mut c, mut sink) = setup(5);
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        c.record_hit(&hit(4, 9.0, 0), &mut sink).expect("test: hit");
        c.end_event(&mut sink).expect("test: end");

        c.begin_event(1, &electron(300.0)).expect("test: begin");
        let record = c.end_event(&mut sink).expect("test: end");
        assert_eq!(record.layer_energy(VolumeId(4)), Some(0.0));
    }

    #[test]
    fn unknown_volume_is_fatal() {
        let (mut c, mut sink) = setup(5);
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        let err = c.record_hit(&hit(42, 1.0, 0), &mut sink).expect_err("test: must fail");
        assert!(matches!(err, LifecycleError::UnknownVolume(VolumeId(42))), "got: {err}");
    }

    #[test]
    fn hit_outside_event_is_fatal() {
        let (mut c, mut sink) = setup(5);
        assert!(matches!(c.record_hit(&hit(3, 1.0, 0), &mut sink), Err(LifecycleError::NoOpenEvent)));

        c.begin_event(0, &electron(300.0)).expect("test: begin");
        c.end_event(&mut sink).expect("test: end");
        assert!(matches!(c.record_hit(&hit(3, 1.0, 0), &mut sink), Err(LifecycleError::NoOpenEvent)));
    }

    #[test]
    fn stale_event_id_is_fatal() {
        let (mut c, mut sink) = setup(5);
        c.begin_event(5, &electron(300.0)).expect("test: begin");
        assert!(matches!(
            c.record_hit(&hit(3, 1.0, 4), &mut sink),
            Err(LifecycleError::StaleEvent { hit: 4, open: 5 })
        ));
    }

    #[test]
    fn nested_begin_rejected() {
        let (mut c, _) = setup(5);
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        assert!(matches!(
            c.begin_event(1, &electron(300.0)),
            Err(LifecycleError::EventAlreadyOpen { open: 0, requested: 1 })
        ));
    }

    #[test]
    fn end_without_begin_rejected() {
        let (mut c, mut sink) = setup(5);
        assert!(matches!(c.end_event(&mut sink), Err(LifecycleError::NoOpenEvent)));
    }

    #[test]
    fn negative_deposit_surfaces_as_error() {
        let (mut c, mut sink) = setup(5);
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        assert!(matches!(
            c.record_hit(&hit(3, -1.0, 0), &mut sink),
            Err(LifecycleError::Accumulator(AccumulatorError::NegativeDeposit { .. }))
        ));
    }

    #[test]
    fn non_finite_position_rejected_without_side_effects() {
        let (mut c, mut sink) = setup(5);
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        let mut bad = hit(1, 0.5, 0);
        bad.position = ThreeVector::new(f64::NAN, 1.0, 0.0);
        assert!(matches!(
            c.record_hit(&bad, &mut sink),
            Err(LifecycleError::NonFinitePosition { volume: VolumeId(1), .. })
        ));
        bad.position = ThreeVector::new(0.0, f64::INFINITY, 0.0);
        assert!(c.record_hit(&bad, &mut sink).is_err());

        assert_eq!(c.hits_seen(), 0);
        assert_eq!(sink.table("Tracker1_x").map(|t| t.row_count()), Some(0));
        assert_eq!(sink.table("Tracker1_y").map(|t| t.row_count()), Some(0));
        assert_eq!(c.apparatus().counter(VolumeId(1)).map(|k| k.read_and_keep()), Some(0.0));
    }

    #[test]
    fn invalid_primary_energy_keeps_controller_idle() {
        let (mut c, mut sink) = setup(5);
        for energy in [-5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                c.begin_event(0, &electron(energy)),
                Err(LifecycleError::InvalidPrimaryEnergy { event_id: 0, .. })
            ));
            assert_eq!(c.state(), &EventState::Idle);
        }
        c.begin_event(0, &electron(0.0)).expect("test: zero energy is valid");
        c.end_event(&mut sink).expect("test: end");
        assert_eq!(sink.table(ENERGY_TABLE).map(|t| t.row_count()), Some(1));
    }

    #[test]
    fn event_id_beyond_exact_column_range_rejected() {
        let (mut c, _) = setup(5);
        assert!(matches!(
            c.begin_event(MAX_EVENT_ID + 1, &electron(300.0)),
            Err(LifecycleError::EventIdOutOfRange(_))
        ));
        c.begin_event(MAX_EVENT_ID, &electron(300.0)).expect("test: largest exact id");
    }

    #[test]
    fn counters_disarmed_after_event_close() {
        let (mut c, mut sink) = setup(5);
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        c.record_hit(&hit(3, 1.0, 0), &mut sink).expect("test: hit");
        c.end_event(&mut sink).expect("test: end");

        let mut apparatus = c.apparatus().clone();
        assert!(matches!(
            apparatus.deposit(VolumeId(3), 1.0),
            Err(LifecycleError::Accumulator(AccumulatorError::NotReset { .. }))
        ));
        assert_eq!(apparatus.counter(VolumeId(3)).map(|k| k.read_and_keep()), Some(1.0));
    }

    #[test]
    fn undeclared_tables_rejected() {
        let mut c = EventController::new(&layout(1));
        let mut sink = RecordingSink::new(OutputTarget::default());
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        assert!(matches!(
            c.record_hit(&hit(1, 1.0, 0), &mut sink),
            Err(LifecycleError::TablesNotDeclared)
        ));
    }

    #[test]
    fn receiver_forwards_to_controller() {
        let (mut c, mut sink) = setup(0);
        c.begin_event(0, &electron(300.0)).expect("test: begin");
        {
            let mut rx = c.receiver(&mut sink);
            rx.on_hit(hit(3, 2.0, 0)).expect("test: on_hit");
            rx.on_hit(hit(3, 0.5, 0)).expect("test: on_hit");
        }
        let record = c.end_event(&mut sink).expect("test: end");
        assert_eq!(record.layer_energies, vec![0.0, 0.0, 2.5]);
        assert_eq!(c.hits_seen(), 2);
    }
}
