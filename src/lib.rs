// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack")

pub mod units;
pub mod types;
pub mod geometry;
pub mod accumulator;
pub mod lifecycle;
pub mod sink;
pub mod source;
pub mod transport;
pub mod run;
pub mod simulation;

pub use types::*;
pub use geometry::{build_layer_stack, construct, DetectorLayout, GeometryParams};
pub use run::{RunConfig, RunController, RunError, RunSummary};
pub use simulation::CaloSimulation;

use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console, js_name = log)]
    fn console_log(s: &str);
}

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
impl CaloSimulation {
    #[wasm_bindgen(constructor)]
    pub fn new(absorber_layers: u32) -> Result<CaloSimulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let params = GeometryParams::with_absorber_layers(absorber_layers);
        let sim = CaloSimulation::build(&params).map_err(to_js_error)?;
        console_log(&format!(
            "stack built: {} layers, {} sensitive",
            sim.layout.layers.len(),
            sim.layout.sensitive_count()
        ));
        Ok(sim)
    }

    /// Open the next event. `particle_code` follows the `ParticleCode` column.
    pub fn begin_event(&mut self, particle_code: u32, energy: f64) -> Result<u64, JsValue> {
        self.begin_event_core(ParticleCode::from_code(particle_code), energy)
            .map_err(to_js_error)
    }

    pub fn deposit(&mut self, volume: u32, energy: f64, x: f64, y: f64, z: f64) -> Result<(), JsValue> {
        self.deposit_core(volume, energy, ThreeVector::new(x, y, z))
            .map_err(to_js_error)
    }

    pub fn end_event(&mut self) -> Result<JsValue, JsValue> {
        let record = self.end_event_core().map_err(to_js_error)?;
        serde_wasm_bindgen::to_value(&record).map_err(to_js_error)
    }

    pub fn layers(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.layout.layers).unwrap_or(JsValue::NULL)
    }

    pub fn tables(&self) -> JsValue {
        serde_wasm_bindgen::to_value(self.sink.tables()).unwrap_or(JsValue::NULL)
    }

    pub fn event_count(&self) -> u32 {
        self.records.len() as u32
    }
}
