//! Browser bindings for the roughness engine.
//!
//! `computeGrid`/`analyzeGrid` run on the calling thread. `WasmTileWorker` is
//! the message handler behind a web worker: it takes `WorkerRequest` objects
//! and answers with a `WorkerResponse`, or `undefined` when nothing is posted
//! (cancel messages and cancelled tiles).
use wasm_bindgen::prelude::*;

use landscape_core::analysis::{analyze, AnalysisOptions};
use landscape_core::{EngineConfig, GridHooks, TileWorker, WorkerRequest};

fn js_err(context: &str, e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{context}: {e}"))
}

/// Parse and validate an engine config. Empty input gives the defaults.
pub fn parse_config(config_json: &str) -> Result<EngineConfig, String> {
    let config: EngineConfig = if config_json.trim().is_empty() {
        EngineConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(|e| format!("invalid config: {e}"))?
    };
    config.validate().map_err(|e| format!("invalid config: {e}"))?;
    Ok(config)
}

pub fn parse_analysis_options(options_json: &str) -> Result<AnalysisOptions, String> {
    if options_json.trim().is_empty() {
        return Ok(AnalysisOptions::default());
    }
    serde_json::from_str(options_json).map_err(|e| format!("invalid analysis options: {e}"))
}

/// JSON-in/JSON-out form of [`WasmTileWorker::handle_message`].
pub fn handle_json(worker: &TileWorker, message_json: &str) -> Result<Option<String>, String> {
    let request: WorkerRequest =
        serde_json::from_str(message_json).map_err(|e| format!("invalid worker message: {e}"))?;
    worker
        .handle(request)
        .map(|resp| serde_json::to_string(&resp).map_err(|e| format!("encoding response: {e}")))
        .transpose()
}

/// Compute a full grid. Returns the `GridData` object.
#[wasm_bindgen(js_name = computeGrid)]
pub fn compute_grid(config_json: &str) -> Result<JsValue, JsValue> {
    let config = parse_config(config_json).map_err(|e| JsValue::from_str(&e))?;
    let grid = landscape_core::compute_grid(&config, GridHooks::default()).map_err(|e| js_err("compute", e))?;
    serde_wasm_bindgen::to_value(&grid).map_err(|e| js_err("serialize", e))
}

/// Compute a grid and run the terrain analysis on it. Returns
/// `{ grid, terrain }`.
#[wasm_bindgen(js_name = analyzeGrid)]
pub fn analyze_grid(config_json: &str, options_json: &str) -> Result<JsValue, JsValue> {
    #[derive(serde::Serialize)]
    struct Out<'a> {
        grid: &'a landscape_core::GridData,
        terrain: landscape_core::analysis::TerrainReport,
    }

    let config = parse_config(config_json).map_err(|e| JsValue::from_str(&e))?;
    let opts = parse_analysis_options(options_json).map_err(|e| JsValue::from_str(&e))?;
    let grid = landscape_core::compute_grid(&config, GridHooks::default()).map_err(|e| js_err("compute", e))?;
    let terrain = analyze(&grid, &opts);
    serde_wasm_bindgen::to_value(&Out { grid: &grid, terrain }).map_err(|e| js_err("serialize", e))
}

/// Explain one cell's roughness. `undefined` when out of range.
#[wasm_bindgen(js_name = explainCell)]
pub fn explain_cell(config_json: &str, ix: usize, iy: usize, top: usize) -> Result<JsValue, JsValue> {
    let config = parse_config(config_json).map_err(|e| JsValue::from_str(&e))?;
    match landscape_core::explain_cell(&config, ix, iy, top).map_err(|e| js_err("explain", e))? {
        Some(e) => serde_wasm_bindgen::to_value(&e).map_err(|e| js_err("serialize", e)),
        None => Ok(JsValue::UNDEFINED),
    }
}

#[wasm_bindgen]
pub struct WasmTileWorker {
    inner: TileWorker,
}

#[wasm_bindgen]
impl WasmTileWorker {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self { inner: TileWorker::new() }
    }

    /// Handle one `tile`/`cancel` message object.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) -> Result<JsValue, JsValue> {
        let request: WorkerRequest =
            serde_wasm_bindgen::from_value(message).map_err(|e| js_err("invalid worker message", e))?;
        match self.inner.handle(request) {
            Some(resp) => serde_wasm_bindgen::to_value(&resp).map_err(|e| js_err("serialize", e)),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Same as `handleMessage` over JSON strings.
    #[wasm_bindgen(js_name = handleJson)]
    pub fn handle_json(&self, message_json: &str) -> Result<Option<String>, JsValue> {
        handle_json(&self.inner, message_json).map_err(|e| JsValue::from_str(&e))
    }
}

impl Default for WasmTileWorker {
    fn default() -> Self {
        Self::new()
    }
}
