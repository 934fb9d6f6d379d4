// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Type Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

pub type EventId = u64;

// ─── Volume Identity ─────────────────────────────────────────────────────────

/// Identity of a sensitive volume. Starts at 1 and is contiguous over the
/// sensitive layers of a stack, so it doubles as the `LayerJ` column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub u32);

impl VolumeId {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── Layer Role ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LayerRole {
    Tracker = 0,
    Absorber = 1,
    Detector = 2,
    MuonCatcher = 3,
}

impl LayerRole {
    /// Absorbers are passive; every other role records energy.
    pub fn is_sensitive(&self) -> bool {
        !matches!(self, Self::Absorber)
    }

    pub fn default_material(&self) -> Material {
        match self {
            Self::Tracker => Material::Silicon,
            Self::Absorber => Material::Lead,
            Self::Detector => Material::LiquidArgon,
            Self::MuonCatcher => Material::Iron,
        }
    }
}

// ─── Material ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Material {
    Vacuum,
    Silicon,
    Lead,
    LiquidArgon,
    Iron,
}

impl Material {
    /// NIST material database name.
    pub fn nist_name(&self) -> &'static str {
        match self {
            Self::Vacuum => "G4_Galactic",
            Self::Silicon => "G4_Si",
            Self::Lead => "G4_Pb",
            Self::LiquidArgon => "G4_lAr",
            Self::Iron => "G4_Fe",
        }
    }
}

// ─── Particle Code ───────────────────────────────────────────────────────────

/// Generated-particle species as written to the `ParticleCode` column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ParticleCode {
    Unknown = 0,
    Electron = 1,
    MuonPlus = 2,
    MuonMinus = 3,
    Proton = 4,
}

impl Default for ParticleCode {
    fn default() -> Self { ParticleCode::Unknown }
}

impl ParticleCode {
    /// Map a particle-table name onto its code. Anything unrecognised is `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "e-" => Self::Electron,
            "mu+" => Self::MuonPlus,
            "mu-" => Self::MuonMinus,
            "proton" => Self::Proton,
            _ => Self::Unknown,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Electron,
            2 => Self::MuonPlus,
            3 => Self::MuonMinus,
            4 => Self::Proton,
            _ => Self::Unknown,
        }
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }

    pub fn as_f64(&self) -> f64 {
        self.code() as f64
    }
}

// ─── ThreeVector ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreeVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ThreeVector {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

// ─── LayerSpec ───────────────────────────────────────────────────────────────

/// One placed tube of the stack. All tubes are solid cylinders coaxial with
/// the beam (z) axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    /// `None` for passive absorbers.
    pub identity: Option<VolumeId>,
    pub role: LayerRole,
    /// Centre of the tube along z.
    pub axial_position: f64,
    /// Half-length along z, as handed to the solid.
    pub thickness: f64,
    pub outer_radius: f64,
    pub material: Material,
}

impl LayerSpec {
    /// Occupied interval along z.
    pub fn extent(&self) -> (f64, f64) {
        (self.axial_position - self.thickness, self.axial_position + self.thickness)
    }

    pub fn is_sensitive(&self) -> bool {
        self.identity.is_some()
    }
}

// ─── HitReport ───────────────────────────────────────────────────────────────

/// A single energy deposit reported by the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitReport {
    pub volume: VolumeId,
    pub energy_deposit: f64,
    pub position: ThreeVector,
    pub event_id: EventId,
}

// ─── PrimaryVertex ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryVertex {
    pub particle: ParticleCode,
    pub particle_name: String,
    pub energy: f64,
    pub position: ThreeVector,
    pub direction: ThreeVector,
}

// ─── EventRecord ─────────────────────────────────────────────────────────────

/// Per-event summary assembled when the event closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: EventId,
    pub generated_energy: f64,
    pub particle: ParticleCode,
    /// One entry per sensitive volume, in identity order.
    pub layer_energies: Vec<f64>,
}

impl EventRecord {
    /// Row for the `Energy` table: generated energy, particle code, then
    /// `Layer1..LayerK`.
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(2 + self.layer_energies.len());
        row.push(self.generated_energy);
        row.push(self.particle.as_f64());
        row.extend_from_slice(&self.layer_energies);
        row
    }

    pub fn total_energy(&self) -> f64 {
        self.layer_energies.iter().sum()
    }

    pub fn layer_energy(&self, id: VolumeId) -> Option<f64> {
        let index = (id.get() as usize).checked_sub(1)?;
        self.layer_energies.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_names_map_to_codes() {
        assert_eq!(ParticleCode::from_name("e-"), ParticleCode::Electron);
        assert_eq!(ParticleCode::from_name("mu+"), ParticleCode::MuonPlus);
        assert_eq!(ParticleCode::from_name("mu-"), ParticleCode::MuonMinus);
        assert_eq!(ParticleCode::from_name("proton"), ParticleCode::Proton);
        assert_eq!(ParticleCode::from_name("gamma"), ParticleCode::Unknown);
        assert_eq!(ParticleCode::Proton.as_f64(), 4.0);
        assert_eq!(ParticleCode::from_code(3), ParticleCode::MuonMinus);
        assert_eq!(ParticleCode::from_code(17), ParticleCode::Unknown);
    }

    #[test]
    fn only_absorbers_are_passive() {
        assert!(LayerRole::Tracker.is_sensitive());
        assert!(LayerRole::Detector.is_sensitive());
        assert!(LayerRole::MuonCatcher.is_sensitive());
        assert!(!LayerRole::Absorber.is_sensitive());
    }

    #[test]
    fn layer_extent_uses_half_length() {
        let layer = LayerSpec {
            name: "Detector1".to_string(),
            identity: Some(VolumeId(3)),
            role: LayerRole::Detector,
            axial_position: 100.0,
            thickness: 25.0,
            outer_radius: 2500.0,
            material: Material::LiquidArgon,
        };
        assert_eq!(layer.extent(), (75.0, 125.0));
    }

    #[test]
    fn event_record_row_layout() {
        let record = EventRecord {
            event_id: 7,
            generated_energy: 300.0,
            particle: ParticleCode::Electron,
            layer_energies: vec![0.0, 1.5, 2.5],
        };
        assert_eq!(record.to_row(), vec![300.0, 1.0, 0.0, 1.5, 2.5]);
        assert_eq!(record.total_energy(), 4.0);
        assert_eq!(record.layer_energy(VolumeId(2)), Some(1.5));
        assert_eq!(record.layer_energy(VolumeId(0)), None);
        assert_eq!(record.layer_energy(VolumeId(4)), None);
    }
}
