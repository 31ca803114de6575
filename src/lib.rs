// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Platoon Negotiation Engine

pub mod types;
pub mod units;
pub mod adapter;
pub mod config;
pub mod network;
pub mod preference;
pub mod vehicle;
pub mod fleet;
pub mod matcher;
pub mod edge_end;
pub mod offer;
pub mod bidding;
pub mod negotiation;
pub mod protocol;
pub mod telemetry;
pub mod simulation;

pub use types::*;
pub use config::SimConfig;
pub use simulation::{PlatoonSimulation, SimError};

use wasm_bindgen::prelude::*;

fn to_js<T: serde::Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
impl PlatoonSimulation {
    /// Build a simulation from a JSON `SimConfig`.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<PlatoonSimulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        PlatoonSimulation::from_json(config_json).map_err(js_error)
    }

    /// West-to-east commuter scenario on a `cols` x `rows` grid.
    pub fn grid(cols: u32, rows: u32, vehicles: u32, alternating: bool, seed: u64) -> Result<PlatoonSimulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let protocol = if alternating {
            ProtocolKind::AlternatingOffers
        } else {
            ProtocolKind::TakeItOrLeaveIt
        };
        let config = SimConfig::grid_scenario(cols, rows, vehicles, protocol, seed);
        PlatoonSimulation::from_config(config).map_err(js_error)
    }

    pub fn tick(&mut self) -> Result<JsValue, JsValue> {
        let result = self.tick_core().map_err(js_error)?;
        Ok(to_js(&result))
    }

    /// Run N ticks without returning results (fast batch mode)
    pub fn run_batch(&mut self, ticks: u32) -> Result<(), JsValue> {
        for _ in 0..ticks {
            if self.is_finished() {
                break;
            }
            self.tick_core().map_err(js_error)?;
        }
        Ok(())
    }

    pub fn run_all(&mut self) -> Result<u64, JsValue> {
        self.run_to_completion().map_err(js_error)
    }

    pub fn finished(&self) -> bool {
        self.is_finished()
    }

    pub fn tick_count(&self) -> u64 {
        self.current_tick
    }

    pub fn get_vehicles(&self) -> JsValue {
        to_js(&self.snapshots())
    }

    pub fn get_vehicle_events(&self, name: &str) -> JsValue {
        match self.fleet.find(name) {
            Some(id) => to_js(&self.fleet.get(id).events()),
            None => JsValue::NULL,
        }
    }

    pub fn get_reports(&self) -> JsValue {
        to_js(&self.reports())
    }

    pub fn get_run_log(&self) -> JsValue {
        to_js(&self.log)
    }

    /// Reset simulation to initial state
    pub fn reset(&mut self) -> Result<(), JsValue> {
        *self = PlatoonSimulation::from_config(self.config.clone()).map_err(js_error)?;
        Ok(())
    }
}
