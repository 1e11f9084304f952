//! Tile-worker protocol.
//!
//! A logical request (`request_id`) is split into tile messages (`tile_id`)
//! handled by isolated workers. Each worker owns one active-request slot with
//! a generation counter: a `cancel` bumps the generation, and the running
//! `compute_tile` observes it at its next poll. Results for a request that was
//! cancelled mid-flight are dropped, never posted.
//!
//! [`TileWorker`] is the synchronous message handler (one per browser worker
//! or per thread). [`TileWorkerPool`] runs N of them on OS threads.
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Cancelled, ComputeError};
use crate::grid::{compute_tile, plan_tiles, stitch_tiles, CellDiagnostics, GridData, GridDiagnostics, TileRect, TileResult};
use crate::sampling::resolve_axes;

// ── Wire messages ─────────────────────────────────────────────────────────────

/// Host → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    #[serde(rename_all = "camelCase")]
    Tile {
        request_id: u64,
        tile_id: u64,
        config: Box<EngineConfig>,
        tile: TileRect,
    },
    #[serde(rename_all = "camelCase")]
    Cancel { request_id: u64 },
}

/// Worker → host. Buffers are moved out of the [`TileResult`], not copied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
    #[serde(rename_all = "camelCase")]
    TileResult {
        request_id: u64,
        tile_id: u64,
        tile: TileRect,
        diagnostics: GridDiagnostics,
        raw: Vec<f64>,
        normalized: Vec<f64>,
        diag_original: Vec<u32>,
        diag_pruned: Vec<u32>,
        diag_invalid: Vec<u32>,
        diag_skipped: Vec<u32>,
        diag_total: Vec<u32>,
        diag_max_pair: Vec<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Error { request_id: u64, message: String },
}

impl WorkerResponse {
    pub fn from_tile(request_id: u64, tile_id: u64, result: TileResult) -> Self {
        let TileResult { tile, raw, normalized, diagnostics, summary } = result;
        let CellDiagnostics { original, pruned, invalid, skipped, total, max_pair } = diagnostics;
        WorkerResponse::TileResult {
            request_id,
            tile_id,
            tile,
            diagnostics: summary,
            raw,
            normalized,
            diag_original: original,
            diag_pruned: pruned,
            diag_invalid: invalid,
            diag_skipped: skipped,
            diag_total: total,
            diag_max_pair: max_pair,
        }
    }

    pub fn request_id(&self) -> u64 {
        match self {
            WorkerResponse::TileResult { request_id, .. } | WorkerResponse::Error { request_id, .. } => {
                *request_id
            }
        }
    }

    /// Inverse of [`WorkerResponse::from_tile`]; `Err` carries the worker's
    /// error message.
    pub fn into_tile_result(self) -> Result<(u64, TileResult), String> {
        match self {
            WorkerResponse::TileResult {
                tile_id,
                tile,
                diagnostics,
                raw,
                normalized,
                diag_original,
                diag_pruned,
                diag_invalid,
                diag_skipped,
                diag_total,
                diag_max_pair,
                ..
            } => Ok((
                tile_id,
                TileResult {
                    tile,
                    raw,
                    normalized,
                    diagnostics: CellDiagnostics {
                        original: diag_original,
                        pruned: diag_pruned,
                        invalid: diag_invalid,
                        skipped: diag_skipped,
                        total: diag_total,
                        max_pair: diag_max_pair,
                    },
                    summary: diagnostics,
                },
            )),
            WorkerResponse::Error { message, .. } => Err(message),
        }
    }
}

// ── Active-request slot ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SlotState {
    active: Option<u64>,
    generation: u64,
    last_cancelled: Option<u64>,
}

/// One-slot mailbox holding a worker's active request id.
///
/// Clones share the slot, so a canceller on another thread reaches the
/// worker without going through its message queue.
#[derive(Debug, Clone, Default)]
pub struct ActiveRequest {
    state: Arc<Mutex<SlotState>>,
}

impl ActiveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `request_id` the active request and return its generation token.
    /// `None` when that request was already cancelled here.
    pub fn activate(&self, request_id: u64) -> Option<u64> {
        let mut s = self.lock();
        if s.last_cancelled == Some(request_id) {
            return None;
        }
        if s.active != Some(request_id) {
            s.active = Some(request_id);
            s.generation = s.generation.wrapping_add(1);
        }
        Some(s.generation)
    }

    /// Clear the slot if `request_id` is active, and refuse later tiles of it.
    pub fn cancel(&self, request_id: u64) {
        let mut s = self.lock();
        s.last_cancelled = Some(request_id);
        if s.active == Some(request_id) {
            s.active = None;
            s.generation = s.generation.wrapping_add(1);
        }
    }

    /// Whether work started under `token` is still wanted.
    pub fn is_current(&self, token: u64) -> bool {
        let s = self.lock();
        s.active.is_some() && s.generation == token
    }

    pub fn active(&self) -> Option<u64> {
        self.lock().active
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Synchronous tile-message handler.
#[derive(Debug, Clone, Default)]
pub struct TileWorker {
    slot: ActiveRequest,
}

impl TileWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(slot: ActiveRequest) -> Self {
        Self { slot }
    }

    pub fn slot(&self) -> &ActiveRequest {
        &self.slot
    }

    /// Handle one message. `None` means nothing is posted back: cancels,
    /// cancelled tiles and results that lost the race with a cancel.
    pub fn handle(&self, request: WorkerRequest) -> Option<WorkerResponse> {
        let (request_id, tile_id, config, tile) = match request {
            WorkerRequest::Cancel { request_id } => {
                self.slot.cancel(request_id);
                return None;
            }
            WorkerRequest::Tile { request_id, tile_id, config, tile } => (request_id, tile_id, config, tile),
        };

        let Some(token) = self.slot.activate(request_id) else {
            log::debug!("skipping tile {tile_id} of cancelled request {request_id}");
            return None;
        };
        let should_cancel = || !self.slot.is_current(token);

        match compute_tile(&config, tile, Some(&should_cancel)) {
            // Re-check: the cancel may have landed after the last poll.
            Ok(result) if self.slot.is_current(token) => Some(WorkerResponse::from_tile(request_id, tile_id, result)),
            Ok(_) => {
                log::debug!("dropping finished tile {tile_id} of cancelled request {request_id}");
                None
            }
            Err(e) if e.is_cancelled() => {
                log::debug!("tile {tile_id} of request {request_id} cancelled");
                None
            }
            Err(e) => {
                log::warn!("tile {tile_id} of request {request_id} failed: {e}");
                Some(WorkerResponse::Error { request_id, message: e.to_string() })
            }
        }
    }
}

// ── Thread pool ───────────────────────────────────────────────────────────────

enum PoolEvent {
    Response(WorkerResponse),
    Cancelled(u64),
}

/// Cancels pool requests from any thread.
#[derive(Clone)]
pub struct PoolCanceller {
    slots: Vec<ActiveRequest>,
    events: Sender<PoolEvent>,
}

impl PoolCanceller {
    pub fn cancel(&self, request_id: u64) {
        for slot in &self.slots {
            slot.cancel(request_id);
        }
        // Wakes a gathering `compute_grid`, whose cancelled tiles never report.
        let _ = self.events.send(PoolEvent::Cancelled(request_id));
    }
}

/// N worker threads sharing one tile queue. Request ids should be unique per
/// [`TileWorkerPool::compute_grid`] call.
pub struct TileWorkerPool {
    requests: Option<Sender<WorkerRequest>>,
    events: Receiver<PoolEvent>,
    canceller: PoolCanceller,
    handles: Vec<JoinHandle<()>>,
}

impl TileWorkerPool {
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let (req_tx, req_rx) = unbounded::<WorkerRequest>();
        let (event_tx, event_rx) = unbounded::<PoolEvent>();

        let mut slots = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let worker = TileWorker::new();
            slots.push(worker.slot().clone());
            let rx = req_rx.clone();
            let tx = event_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("tile-worker-{i}"))
                .spawn(move || worker_loop(worker, rx, tx))?;
            handles.push(handle);
        }
        log::debug!("started {workers} tile workers");

        Ok(Self {
            requests: Some(req_tx),
            events: event_rx,
            canceller: PoolCanceller { slots, events: event_tx },
            handles,
        })
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    pub fn canceller(&self) -> PoolCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&self, request_id: u64) {
        self.canceller.cancel(request_id);
    }

    /// Compute the grid as `tile_size × tile_size` tiles across the pool and
    /// stitch the results. A worker error cancels the remaining tiles.
    pub fn compute_grid(
        &mut self,
        config: &EngineConfig,
        tile_size: usize,
        request_id: u64,
    ) -> Result<GridData, ComputeError> {
        config.validate()?;
        let (x_axis, y_axis) = resolve_axes(config)?;
        let tiles = plan_tiles(x_axis.len(), y_axis.len(), tile_size, tile_size);
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| ComputeError::Worker("worker pool is shut down".into()))?;

        for (tile_id, &tile) in tiles.iter().enumerate() {
            let msg = WorkerRequest::Tile {
                request_id,
                tile_id: tile_id as u64,
                config: Box::new(config.clone()),
                tile,
            };
            requests
                .send(msg)
                .map_err(|_| ComputeError::Worker("tile queue disconnected".into()))?;
        }
        log::debug!("request {request_id}: dispatched {} tiles to {} workers", tiles.len(), self.workers());

        let mut results = Vec::with_capacity(tiles.len());
        while results.len() < tiles.len() {
            let event = self
                .events
                .recv()
                .map_err(|_| ComputeError::Worker("all tile workers exited".into()))?;
            match event {
                PoolEvent::Cancelled(id) if id == request_id => {
                    log::debug!("request {request_id} cancelled with {}/{} tiles", results.len(), tiles.len());
                    return Err(Cancelled.into());
                }
                PoolEvent::Response(resp) if resp.request_id() == request_id => match resp.into_tile_result() {
                    Ok((_, tile)) => results.push(tile),
                    Err(message) => {
                        self.canceller.cancel(request_id);
                        return Err(ComputeError::Worker(message));
                    }
                },
                // Stale events from earlier requests.
                _ => {}
            }
        }
        stitch_tiles(config, results)
    }

    /// Stop accepting work and join every worker thread.
    pub fn shutdown(&mut self) {
        self.requests = None;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("tile worker thread panicked");
            }
        }
    }
}

impl Drop for TileWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(worker: TileWorker, requests: Receiver<WorkerRequest>, events: Sender<PoolEvent>) {
    while let Ok(request) = requests.recv() {
        let request_id = match &request {
            WorkerRequest::Tile { request_id, .. } | WorkerRequest::Cancel { request_id } => *request_id,
        };
        let response = match catch_unwind(AssertUnwindSafe(|| worker.handle(request))) {
            Ok(r) => r,
            Err(_) => Some(WorkerResponse::Error { request_id, message: "tile computation panicked".into() }),
        };
        if let Some(response) = response {
            if events.send(PoolEvent::Response(response)).is_err() {
                break;
            }
        }
    }
}
