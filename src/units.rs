// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Units

//! Internal unit system: millimetre and MeV.
//!
//! Geometry and gun parameters are written as `250.0 * CM` or `300.0 * MEV`
//! so the numbers read the same as on the apparatus drawing.

pub const MM: f64 = 1.0;
pub const CM: f64 = 10.0 * MM;
pub const M: f64 = 1000.0 * MM;

pub const MEV: f64 = 1.0;
pub const KEV: f64 = 1.0e-3 * MEV;
pub const GEV: f64 = 1.0e3 * MEV;
