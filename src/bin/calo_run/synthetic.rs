// Synthetic Hit Generator: seedable, not physics
// Stands in for a transport engine so the recording pipeline can be driven end to end

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use calo_engine::geometry::DetectorLayout;
use calo_engine::lifecycle::{HitReceiver, LifecycleError};
use calo_engine::transport::TransportEngine;
use calo_engine::*;

/// Mean deposit per hit, by role (MeV)
const MEAN_DEPOSIT: [(LayerRole, f64); 3] = [
    (LayerRole::Tracker, 0.1),
    (LayerRole::Detector, 5.0),
    (LayerRole::MuonCatcher, 2.0),
];

/// Lateral jitter of hit positions around the beam line (mm)
const LATERAL_JITTER: f64 = 1.0;

pub struct SyntheticTransport {
    seed: u64,
    mean_hits: f64,
}

impl SyntheticTransport {
    pub fn new(seed: u64, mean_hits: f64) -> Self {
        Self { seed, mean_hits }
    }

    fn mean_deposit(role: LayerRole) -> f64 {
        MEAN_DEPOSIT
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, e)| *e)
            .unwrap_or(0.0)
    }
}

impl TransportEngine for SyntheticTransport {
    /// Walk the straight line of the primary through every sensitive layer it
    /// crosses. Each crossing yields a Poisson number of hits with exponential
    /// deposits, capped by the energy the primary has left.
    fn transport(
        &mut self,
        event_id: EventId,
        primary: &PrimaryVertex,
        layout: &DetectorLayout,
        hits: &mut dyn HitReceiver,
    ) -> Result<(), LifecycleError> {
        // Seeded per event so results do not depend on how events are split across workers
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(event_id));
        let dir = primary.direction;
        if dir.z.abs() < f64::EPSILON {
            return Ok(());
        }

        let mut remaining = primary.energy;
        for layer in layout.sensitive_layers() {
            let Some(volume) = layer.identity else { continue };
            let t = (layer.axial_position - primary.position.z) / dir.z;
            if t < 0.0 {
                continue;
            }
            let cx = primary.position.x + dir.x * t;
            let cy = primary.position.y + dir.y * t;
            if (cx * cx + cy * cy).sqrt() > layer.outer_radius {
                continue;
            }

            let n = poisson_sample(&mut rng, self.mean_hits);
            for _ in 0..n {
                let u: f64 = rng.gen();
                let energy = (-(1.0 - u).ln() * Self::mean_deposit(layer.role)).min(remaining);
                remaining -= energy;
                let position = ThreeVector::new(
                    cx + rng.gen_range(-LATERAL_JITTER..LATERAL_JITTER),
                    cy + rng.gen_range(-LATERAL_JITTER..LATERAL_JITTER),
                    layer.axial_position,
                );
                hits.on_hit(HitReport { volume, energy_deposit: energy, position, event_id })?;
            }
        }
        Ok(())
    }
}

/// Poisson sampling via Knuth algorithm.
/// For λ < 30, uses direct method. For larger λ, uses normal approximation.
fn poisson_sample(rng: &mut ChaCha8Rng, lambda: f64) -> u32 {
    if lambda <= 0.0 {
        return 0;
    }
    if lambda < 30.0 {
        let l = (-lambda).exp();
        let mut k: u32 = 0;
        let mut p: f64 = 1.0;
        loop {
            k += 1;
            p *= rng.gen::<f64>();
            if p <= l {
                return k - 1;
            }
        }
    } else {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();
        let z = (-2.0 * (1.0 - u1).ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let result = lambda + lambda.sqrt() * z;
        result.round().max(0.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calo_engine::geometry::{build_layer_stack, GeometryParams};
    use calo_engine::source::{ParticleGun, ParticleSource};

    fn layout() -> DetectorLayout {
        let params = GeometryParams::default();
        DetectorLayout {
            world_half_length: params.world_half_length,
            layers: build_layer_stack(&params),
            magnetic_field: params.magnetic_field,
        }
    }

    #[test]
    fn test_poisson_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let lambda = 3.0;
        let n = 10000;
        let sum: u64 = (0..n).map(|_| poisson_sample(&mut rng, lambda) as u64).sum();
        let mean = sum as f64 / n as f64;
        assert!((mean - lambda).abs() < 0.2, "Poisson mean {} far from λ={}", mean, lambda);
    }

    #[test]
    fn test_same_seed_same_hits() {
        let layout = layout();
        let primary = ParticleGun::default().next_primary(5);
        let mut a: Vec<HitReport> = Vec::new();
        let mut b: Vec<HitReport> = Vec::new();
        SyntheticTransport::new(7, 2.0).transport(5, &primary, &layout, &mut a).unwrap();
        SyntheticTransport::new(7, 2.0).transport(5, &primary, &layout, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hits_are_sensitive_and_bounded() {
        let layout = layout();
        let primary = ParticleGun::default().next_primary(0);
        let mut hits: Vec<HitReport> = Vec::new();
        SyntheticTransport::new(1, 4.0).transport(0, &primary, &layout, &mut hits).unwrap();
        let total: f64 = hits.iter().map(|h| h.energy_deposit).sum();
        assert!(total <= primary.energy + 1e-9, "deposited {} > primary {}", total, primary.energy);
        for h in &hits {
            assert!(layout.layer(h.volume).is_some(), "hit on unknown volume {}", h.volume);
            assert!(h.energy_deposit >= 0.0);
        }
    }
}
