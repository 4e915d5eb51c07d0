//! Farm Simulation Library
//!
//! Field-coverage path planning and vehicle/implement simulation for a
//! farm-management game. Runs headless; rendering lives elsewhere.

pub mod simulation;
