// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Layer-Stack Builder

//! Procedural construction of the detector stack.
//!
//! The stack is a world box holding coaxial solid tubes along the beam (z)
//! axis:
//!
//! ```text
//!  Tracker1   Tracker2  Absorber1 Detector1 ... AbsorberN DetectorN   Muon
//!    ||         ||        |█|   [  lAr  ]       |█|   [  lAr  ]   [  Fe  ]
//! ---++---------++--------+-+---+-------+-------+-+---+-------+---+------+--> z
//! ```
//!
//! [`build_layer_stack`] is a pure function of [`GeometryParams`]. Placing the
//! result through a [`GeometryLibrary`] is done by [`construct`], which aborts
//! on the first overlap.

use serde::{Deserialize, Serialize};

use crate::types::{LayerRole, LayerSpec, Material, ThreeVector, VolumeId};
use crate::units::CM;

/// Two extents closer than this are treated as touching, not overlapping.
const OVERLAP_TOLERANCE: f64 = 1.0e-9;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("invalid geometry parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("expected exactly 2 tracker positions, got {0}")]
    TrackerCount(usize),

    #[error("volume {volume} [{lo}, {hi}] overlaps an existing placement")]
    Overlap { volume: String, lo: f64, hi: f64 },

    #[error("volume {volume} is not placed after its predecessor along z")]
    OutOfOrder { volume: String },

    #[error("sensitive identities are not contiguous: expected {expected}, found {found}")]
    IdentityGap { expected: u32, found: u32 },

    #[error("no world volume placed")]
    WorldNotPlaced,
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Geometric parameters of the stack. All thicknesses are half-lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryParams {
    pub world_half_length: f64,

    pub tracker_positions: Vec<f64>,
    pub tracker_thickness: f64,
    pub tracker_radius: f64,

    pub absorber_layers: u32,
    pub absorber_thickness: f64,
    pub absorber_radius: f64,

    pub detector_thickness: f64,
    pub detector_radius: f64,

    pub muon_thickness: f64,
    pub muon_radius: f64,

    /// Uniform field handed to the transport engine. Zero means no field.
    pub magnetic_field: ThreeVector,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            world_half_length: 1000.0 * CM,
            tracker_positions: vec![0.0, 200.0 * CM],
            tracker_thickness: 0.2 * CM,
            tracker_radius: 250.0 * CM,
            absorber_layers: 5,
            absorber_thickness: 0.5 * CM,
            absorber_radius: 250.0 * CM,
            detector_thickness: 25.0 * CM,
            detector_radius: 250.0 * CM,
            muon_thickness: 50.0 * CM,
            muon_radius: 250.0 * CM,
            magnetic_field: ThreeVector::default(),
        }
    }
}

impl GeometryParams {
    pub fn with_absorber_layers(absorber_layers: u32) -> Self {
        Self { absorber_layers, ..Self::default() }
    }

    /// Number of sensitive volumes the stack will contain:
    /// trackers + one detector per absorber + the muon catcher.
    pub fn sensitive_count(&self) -> usize {
        self.tracker_positions.len() + self.absorber_layers as usize + 1
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.tracker_positions.len() != 2 {
            return Err(GeometryError::TrackerCount(self.tracker_positions.len()));
        }
        let sizes = [
            ("world_half_length", self.world_half_length),
            ("tracker_thickness", self.tracker_thickness),
            ("tracker_radius", self.tracker_radius),
            ("absorber_thickness", self.absorber_thickness),
            ("absorber_radius", self.absorber_radius),
            ("detector_thickness", self.detector_thickness),
            ("detector_radius", self.detector_radius),
            ("muon_thickness", self.muon_thickness),
            ("muon_radius", self.muon_radius),
        ];
        for (name, value) in sizes {
            if !value.is_finite() || value <= 0.0 {
                return Err(GeometryError::InvalidParameter { name, value });
            }
        }
        for &z in &self.tracker_positions {
            if !z.is_finite() {
                return Err(GeometryError::InvalidParameter { name: "tracker_positions", value: z });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pure builder
// ---------------------------------------------------------------------------

/// Compute the ordered layer sequence for `params`.
///
/// Trackers sit at their explicit offsets. Absorber/detector pairs follow,
/// driven by a cursor that advances one half-length before a layer's centre
/// is recorded and one half-length after, so consecutive layers touch. The
/// cursor starts one tracker half-length plus one absorber half-length past
/// the last tracker, leaving an absorber half-length gap behind it. The muon
/// catcher closes the stack.
pub fn build_layer_stack(params: &GeometryParams) -> Vec<LayerSpec> {
    let n_trackers = params.tracker_positions.len();
    let mut layers = Vec::with_capacity(n_trackers + 2 * params.absorber_layers as usize + 1);
    let mut next_id: u32 = 1;

    for (i, &z) in params.tracker_positions.iter().enumerate() {
        layers.push(LayerSpec {
            name: format!("Tracker{}", i + 1),
            identity: Some(VolumeId(next_id)),
            role: LayerRole::Tracker,
            axial_position: z,
            thickness: params.tracker_thickness,
            outer_radius: params.tracker_radius,
            material: LayerRole::Tracker.default_material(),
        });
        next_id += 1;
    }

    let last_tracker = params.tracker_positions.last().copied().unwrap_or(0.0);
    let mut z = last_tracker + params.tracker_thickness + params.absorber_thickness;

    for index in 1..=params.absorber_layers {
        z += params.absorber_thickness;
        layers.push(LayerSpec {
            name: format!("Absorber{}", index),
            identity: None,
            role: LayerRole::Absorber,
            axial_position: z,
            thickness: params.absorber_thickness,
            outer_radius: params.absorber_radius,
            material: LayerRole::Absorber.default_material(),
        });
        z += params.absorber_thickness;

        z += params.detector_thickness;
        layers.push(LayerSpec {
            name: format!("Detector{}", index),
            identity: Some(VolumeId(next_id)),
            role: LayerRole::Detector,
            axial_position: z,
            thickness: params.detector_thickness,
            outer_radius: params.detector_radius,
            material: LayerRole::Detector.default_material(),
        });
        next_id += 1;
        z += params.detector_thickness;
    }

    layers.push(LayerSpec {
        name: "Muon".to_string(),
        identity: Some(VolumeId(next_id)),
        role: LayerRole::MuonCatcher,
        axial_position: z + params.muon_thickness,
        thickness: params.muon_thickness,
        outer_radius: params.muon_radius,
        material: LayerRole::MuonCatcher.default_material(),
    });

    layers
}

/// Check the ordering invariants of a layer sequence: strictly increasing
/// centres, neighbours that never intersect, and sensitive identities that
/// run 1..=K without gaps.
pub fn validate_stack(layers: &[LayerSpec]) -> Result<(), GeometryError> {
    for pair in layers.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.axial_position <= prev.axial_position {
            return Err(GeometryError::OutOfOrder { volume: next.name.clone() });
        }
        let (_, prev_hi) = prev.extent();
        let (lo, hi) = next.extent();
        if lo < prev_hi - OVERLAP_TOLERANCE {
            return Err(GeometryError::Overlap { volume: next.name.clone(), lo, hi });
        }
    }

    let mut expected = 1;
    for id in layers.iter().filter_map(|l| l.identity) {
        if id.get() != expected {
            return Err(GeometryError::IdentityGap { expected, found: id.get() });
        }
        expected += 1;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Geometry library boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub handle: PlacementHandle,
    pub overlaps_existing: bool,
}

/// Placement primitive supplied by the solid-modelling layer.
pub trait GeometryLibrary {
    /// Place the world box, centred at the origin and unrotated.
    fn place_world(&mut self, half_length: f64, material: Material) -> PlacementHandle;

    /// Place one tube inside the world and report whether it overlaps
    /// anything already placed (or sticks out of the world).
    fn place_volume(&mut self, layer: &LayerSpec) -> Result<Placement, GeometryError>;
}

/// Axial overlap checker for coaxial tubes in a box world.
#[derive(Debug, Clone, Default)]
pub struct AxialOverlapChecker {
    world_half_length: Option<f64>,
    placed: Vec<(f64, f64)>,
}

impl AxialOverlapChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }
}

impl GeometryLibrary for AxialOverlapChecker {
    fn place_world(&mut self, half_length: f64, _material: Material) -> PlacementHandle {
        self.world_half_length = Some(half_length);
        self.placed.clear();
        PlacementHandle(0)
    }

    fn place_volume(&mut self, layer: &LayerSpec) -> Result<Placement, GeometryError> {
        let world = self.world_half_length.ok_or(GeometryError::WorldNotPlaced)?;
        let (lo, hi) = layer.extent();

        let outside_world = lo < -world || hi > world || layer.outer_radius > world;
        let intersects = self
            .placed
            .iter()
            .any(|&(p_lo, p_hi)| lo < p_hi - OVERLAP_TOLERANCE && p_lo < hi - OVERLAP_TOLERANCE);

        self.placed.push((lo, hi));
        Ok(Placement {
            handle: PlacementHandle(self.placed.len()),
            overlaps_existing: outside_world || intersects,
        })
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// The constructed apparatus: world size plus placed layers in z order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorLayout {
    pub world_half_length: f64,
    pub layers: Vec<LayerSpec>,
    pub magnetic_field: ThreeVector,
}

impl DetectorLayout {
    pub fn sensitive_layers(&self) -> impl Iterator<Item = &LayerSpec> {
        self.layers.iter().filter(|l| l.is_sensitive())
    }

    pub fn sensitive_count(&self) -> usize {
        self.sensitive_layers().count()
    }

    /// Tracking layers in placement order.
    pub fn trackers(&self) -> impl Iterator<Item = &LayerSpec> {
        self.layers.iter().filter(|l| l.role == LayerRole::Tracker)
    }

    pub fn layer(&self, id: VolumeId) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.identity == Some(id))
    }
}

/// Build and place the full stack. Any overlap aborts construction.
pub fn construct<G: GeometryLibrary>(
    params: &GeometryParams,
    library: &mut G,
) -> Result<DetectorLayout, GeometryError> {
    params.validate()?;

    library.place_world(params.world_half_length, Material::Vacuum);

    let layers = build_layer_stack(params);
    for layer in &layers {
        let placement = library.place_volume(layer)?;
        if placement.overlaps_existing {
            let (lo, hi) = layer.extent();
            log::error!("overlap detected placing {} at z={}", layer.name, layer.axial_position);
            return Err(GeometryError::Overlap { volume: layer.name.clone(), lo, hi });
        }
    }
    validate_stack(&layers)?;

    let layout = DetectorLayout {
        world_half_length: params.world_half_length,
        layers,
        magnetic_field: params.magnetic_field,
    };
    log::info!(
        "constructed stack: {} layers, {} sensitive volumes, {} absorber/detector pairs",
        layout.layers.len(),
        layout.sensitive_count(),
        params.absorber_layers
    );
    Ok(layout)
}
