// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Transport Boundary

//! The transport engine decides what a hit is and how much energy it
//! carries. This crate only defines the seam: an engine receives the event's
//! primary and the layout, and pushes hits in time order into a
//! [`HitReceiver`]. Returning from [`TransportEngine::transport`] signals
//! that the event is complete.

use std::collections::HashMap;

use crate::geometry::DetectorLayout;
use crate::lifecycle::{HitReceiver, LifecycleError};
use crate::types::{EventId, HitReport, PrimaryVertex};

pub trait TransportEngine {
    fn transport(
        &mut self,
        event_id: EventId,
        primary: &PrimaryVertex,
        layout: &DetectorLayout,
        hits: &mut dyn HitReceiver,
    ) -> Result<(), LifecycleError>;
}

/// Replays pre-recorded hits. Events with no script produce no hits.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: HashMap<EventId, Vec<HitReport>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group a flat hit list by event id, keeping per-event order.
    pub fn from_hits(hits: impl IntoIterator<Item = HitReport>) -> Self {
        let mut script = Self::new();
        for hit in hits {
            script.push(hit);
        }
        script
    }

    pub fn push(&mut self, hit: HitReport) {
        self.script.entry(hit.event_id).or_default().push(hit);
    }

    pub fn hit_count(&self) -> usize {
        self.script.values().map(Vec::len).sum()
    }
}

impl TransportEngine for ScriptedTransport {
    fn transport(
        &mut self,
        event_id: EventId,
        _primary: &PrimaryVertex,
        _layout: &DetectorLayout,
        hits: &mut dyn HitReceiver,
    ) -> Result<(), LifecycleError> {
        if let Some(script) = self.script.get(&event_id) {
            for hit in script {
                hits.on_hit(*hit)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{build_layer_stack, GeometryParams};
    use crate::types::{ParticleCode, ThreeVector, VolumeId};

    fn hit(volume: u32, energy: f64, event_id: EventId) -> HitReport {
        HitReport {
            volume: VolumeId(volume),
            energy_deposit: energy,
            position: ThreeVector::default(),
            event_id,
        }
    }

    #[test]
    fn replays_hits_for_matching_event_in_order() {
        let mut engine = ScriptedTransport::from_hits(vec![
            hit(1, 1.0, 0),
            hit(3, 2.0, 1),
            hit(4, 3.0, 0),
        ]);
        assert_eq!(engine.hit_count(), 3);

        let params = GeometryParams::default();
        let layout = DetectorLayout {
            world_half_length: params.world_half_length,
            layers: build_layer_stack(&params),
            magnetic_field: params.magnetic_field,
        };
        let primary = PrimaryVertex {
            particle: ParticleCode::Proton,
            particle_name: "proton".to_string(),
            energy: 1.0,
            position: ThreeVector::default(),
            direction: ThreeVector::new(0.0, 0.0, 1.0),
        };

        let mut received: Vec<HitReport> = Vec::new();
        engine
            .transport(0, &primary, &layout, &mut received)
            .expect("test: transport");
        assert_eq!(received, vec![hit(1, 1.0, 0), hit(4, 3.0, 0)]);

        let mut none: Vec<HitReport> = Vec::new();
        engine
            .transport(9, &primary, &layout, &mut none)
            .expect("test: transport");
        assert!(none.is_empty());
    }
}
