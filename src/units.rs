// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine - Unit Conversion
//
// The simulation moves vehicles in "blocks" per "timestep". Configuration and
// reports speak metres, seconds and km/h.

/// Physical length of one simulation block (a car length plus headway).
pub const BLOCK_LENGTH_M: f64 = 5.0;

/// Wall-clock duration of one simulation timestep.
pub const TIMESTEP_S: f64 = 1.0;

/// Speed sentinel for segments without background flow.
pub const UNBOUNDED_SPEED: f64 = 1.0e9;

pub fn meters_to_blocks(meters: f64) -> f64 {
    meters / BLOCK_LENGTH_M
}

pub fn blocks_to_meters(blocks: f64) -> f64 {
    blocks * BLOCK_LENGTH_M
}

pub fn seconds_to_steps(seconds: f64) -> u64 {
    (seconds / TIMESTEP_S).ceil().max(0.0) as u64
}

pub fn steps_to_seconds(steps: u64) -> f64 {
    steps as f64 * TIMESTEP_S
}

pub fn kmh_to_blocks_per_step(kmh: f64) -> f64 {
    meters_to_blocks(kmh / 3.6) * TIMESTEP_S
}

pub fn blocks_per_step_to_kmh(speed: f64) -> f64 {
    blocks_to_meters(speed) / TIMESTEP_S * 3.6
}

/// m/s² to blocks/step².
pub fn accel_to_blocks(mps2: f64) -> f64 {
    meters_to_blocks(mps2) * TIMESTEP_S * TIMESTEP_S
}

/// Segment speed (blocks/step) for an edge carrying `flow` background vehicles
/// per step with the given `capacity` in blocks/step.
///
/// Zero flow means nothing slows the segment down, so the unbounded sentinel is
/// returned and the vehicle's own max speed applies.
pub fn segment_speed(capacity: f64, flow: f64) -> f64 {
    if flow <= 0.0 {
        return UNBOUNDED_SPEED;
    }
    (capacity / flow).max(0.0)
}
