//! Platoon Simulation Library
//!
//! Simulates platoons of vehicles on a closed multi-lane loop under ACC, BCC
//! or a blended ACC+BCC control law.

pub mod simulation;
