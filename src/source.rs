// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Particle Source

use serde::{Deserialize, Serialize};

use crate::types::{EventId, ParticleCode, PrimaryVertex, ThreeVector};
use crate::units::{CM, MEV};

/// Upstream producer of one primary particle per event.
pub trait ParticleSource {
    fn next_primary(&mut self, event_id: EventId) -> PrimaryVertex;
}

// ─── Gun Configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GunConfig {
    /// Particle-table name, e.g. `e-`, `mu+`, `proton`.
    pub particle: String,
    pub energy: f64,
    pub position: ThreeVector,
    pub direction: ThreeVector,
    /// Added to the energy after every shot. Zero keeps the beam monochromatic.
    pub energy_step: f64,
}

impl Default for GunConfig {
    fn default() -> Self {
        Self {
            particle: "e-".to_string(),
            energy: 300.0 * MEV,
            position: ThreeVector::new(0.0, 0.0, -250.0 * CM),
            direction: ThreeVector::new(0.0, 0.0, 1.0),
            energy_step: 0.0,
        }
    }
}

// ─── ParticleGun ─────────────────────────────────────────────────────────────

/// Fires a single particle per event from a fixed point along a fixed direction.
#[derive(Debug, Clone)]
pub struct ParticleGun {
    config: GunConfig,
    code: ParticleCode,
    current_energy: f64,
    shots: u64,
}

impl ParticleGun {
    pub fn new(config: GunConfig) -> Self {
        let code = ParticleCode::from_name(&config.particle);
        if code == ParticleCode::Unknown {
            log::warn!("particle {:?} has no code, recording it as Unknown", config.particle);
        }
        let current_energy = config.energy;
        Self { config, code, current_energy, shots: 0 }
    }

    pub fn current_energy(&self) -> f64 {
        self.current_energy
    }

    pub fn shots(&self) -> u64 {
        self.shots
    }

    /// Jump the energy ramp forward as if `shots` particles had been fired.
    /// Used by parallel workers that start mid-run.
    pub fn skip(&mut self, shots: u64) {
        self.current_energy += self.config.energy_step * shots as f64;
        self.shots += shots;
    }
}

impl Default for ParticleGun {
    fn default() -> Self {
        Self::new(GunConfig::default())
    }
}

impl ParticleSource for ParticleGun {
    fn next_primary(&mut self, _event_id: EventId) -> PrimaryVertex {
        let vertex = PrimaryVertex {
            particle: self.code,
            particle_name: self.config.particle.clone(),
            energy: self.current_energy,
            position: self.config.position,
            direction: self.config.direction,
        };
        self.current_energy += self.config.energy_step;
        self.shots += 1;
        vertex
    }
}
