// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The render engine: a single background worker that renders the
//! most recently submitted job in successive passes of increasing
//! detail, handing each finished pass to a sink as a [`Frame`].
//!
//! There is no queue.  Submitting a job while another is rendering
//! cancels the running one at its next row boundary and the worker
//! moves straight on to the new parameters; the abandoned job's
//! remaining passes are never produced.

use image::RgbImage;
use num::Complex;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cancellation::CancelToken;
use crate::colormap::Colormap;
use crate::error::{Result, ServerError};
use crate::escape::{iteration_budget, EscapeTimeRenderer, PassOutcome};
use crate::planes::PlaneMapper;

/// When the first pass finds nothing outside the set, rendering
/// resumes at this pass instead of grinding through the cheap ones.
pub const ALL_INTERIOR_SKIP_TO: u32 = 4;

/// Identifies the connection a job was submitted for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Where and how to render.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderParameters {
    /// The point under the center of the image.
    pub center: Complex<f64>,
    /// Complex-plane units per output pixel, before the pixel ratio.
    pub scale_factor: f64,
    /// Output width in device-independent pixels.
    pub width: u32,
    /// Output height in device-independent pixels.
    pub height: u32,
    /// Device pixels per output pixel.
    pub pixel_ratio: f64,
    /// Packed `0xRRGGBB` tint for the colormap.
    pub color: u32,
}

impl RenderParameters {
    /// The size of the image actually rendered, in device pixels.
    pub fn pixel_grid(&self) -> (u32, u32) {
        (
            scale_extent(self.width, self.pixel_ratio),
            scale_extent(self.height, self.pixel_ratio),
        )
    }

    /// The per-device-pixel scale used for rendering.
    pub fn effective_scale(&self) -> f64 {
        self.scale_factor / self.pixel_ratio
    }
}

fn scale_extent(extent: u32, ratio: f64) -> u32 {
    let scaled = (f64::from(extent) * ratio).round();
    if scaled <= 0.0 {
        0
    } else if scaled >= f64::from(u32::max_value()) {
        u32::max_value()
    } else {
        scaled as u32
    }
}

/// A render request bound to the connection waiting for it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Job {
    /// The connection the frames belong to.
    pub connection: ConnectionId,
    /// What to render.
    pub params: RenderParameters,
}

/// One completed pass.
#[derive(Clone, Debug)]
pub struct Frame {
    /// The connection whose job produced this frame.
    pub connection: ConnectionId,
    /// The rendered pixels, `pixel_grid()` in size.
    pub image: RgbImage,
    /// Zero-based pass index.
    pub pass: u32,
    /// Configured number of passes.
    pub passes: u32,
    /// Iteration budget of this pass.
    pub iterations: u32,
    /// Wall time spent on this pass.
    pub elapsed: Duration,
    /// The scale factor as requested, not divided by the pixel ratio.
    pub scale_factor: f64,
}

impl Frame {
    /// Human readable pass summary, e.g.
    /// `Pass 1/4, max iterations: 96, time: 12ms`.
    pub fn info(&self) -> String {
        let millis = self.elapsed.as_millis();
        let time = if millis > 2000 {
            format!("{}s", millis / 1000)
        } else {
            format!("{}ms", millis)
        };
        format!(
            "Pass {}/{}, max iterations: {}, time: {}",
            self.pass + 1,
            self.passes,
            self.iterations,
            time
        )
    }
}

type Sink = Box<dyn FnMut(Frame) + Send>;

struct JobSlot {
    pending: Option<Job>,
    current: CancelToken,
    abort: bool,
}

struct Shared {
    slot: Mutex<JobSlot>,
    wake: Condvar,
    passes: u32,
}

enum Worker {
    Idle(Sink),
    Running(JoinHandle<()>),
    Stopped,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the render worker.  The worker thread is started by the first
/// [`submit`](RenderEngine::submit) and lives until
/// [`shutdown`](RenderEngine::shutdown) or drop.
pub struct RenderEngine {
    shared: Arc<Shared>,
    worker: Mutex<Worker>,
}

impl RenderEngine {
    /// Create an idle engine that renders `passes` passes per job and
    /// hands every completed pass to `sink`, on the worker thread.
    pub fn new<S>(passes: u32, sink: S) -> RenderEngine
    where
        S: FnMut(Frame) + Send + 'static,
    {
        RenderEngine {
            shared: Arc::new(Shared {
                slot: Mutex::new(JobSlot {
                    pending: None,
                    current: CancelToken::new(),
                    abort: false,
                }),
                wake: Condvar::new(),
                passes,
            }),
            worker: Mutex::new(Worker::Idle(Box::new(sink))),
        }
    }

    /// Number of passes rendered per job.
    pub fn passes(&self) -> u32 {
        self.shared.passes
    }

    /// True while the worker thread exists.
    pub fn is_running(&self) -> bool {
        match *lock(&self.worker) {
            Worker::Running(_) => true,
            _ => false,
        }
    }

    /// Make `job` the one and only job.  Whatever was rendering is
    /// cancelled; a job that was submitted but not yet picked up is
    /// replaced.
    pub fn submit(&self, job: Job) -> Result<()> {
        let mut worker = lock(&self.worker);
        {
            let mut slot = lock(&self.shared.slot);
            if slot.abort {
                return Err(ServerError::EngineStopped);
            }
            slot.current.cancel();
            if let Some(replaced) = slot.pending.replace(job) {
                debug!(connection = replaced.connection.0, "pending job superseded");
            }
        }
        self.shared.wake.notify_one();

        *worker = match mem::replace(&mut *worker, Worker::Stopped) {
            Worker::Idle(sink) => {
                let shared = Arc::clone(&self.shared);
                let handle = thread::Builder::new()
                    .name("render-worker".to_string())
                    .spawn(move || run(&shared, sink))
                    .map_err(ServerError::Worker)?;
                debug!("render worker started");
                Worker::Running(handle)
            }
            other => other,
        };
        debug!(connection = job.connection.0, "job submitted");
        Ok(())
    }

    /// Stop the worker and wait for it to exit.  The row being
    /// rendered is finished first.  Idempotent.
    pub fn shutdown(&self) {
        {
            let mut slot = lock(&self.shared.slot);
            slot.abort = true;
            slot.current.cancel();
        }
        self.shared.wake.notify_all();

        let worker = mem::replace(&mut *lock(&self.worker), Worker::Stopped);
        if let Worker::Running(handle) = worker {
            if handle.join().is_err() {
                warn!("render worker panicked");
            }
        }
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    /// Block until there is a job to render or the engine is shutting
    /// down.  Hands out a fresh token for the job it returns.
    fn next_job(&self) -> Option<(Job, CancelToken)> {
        let mut slot = lock(&self.slot);
        loop {
            if slot.abort {
                return None;
            }
            if let Some(job) = slot.pending.take() {
                slot.current = CancelToken::new();
                return Some((job, slot.current.clone()));
            }
            slot = self.wake.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn run(shared: &Shared, mut sink: Sink) {
    while let Some((job, token)) = shared.next_job() {
        render_job(&job, shared.passes, &token, &mut sink);
    }
    debug!("render worker exiting");
}

/// Render all passes of one job, stopping early if `token` is
/// cancelled.  Returns the number of frames handed to `sink`.
fn render_job<F>(job: &Job, passes: u32, token: &CancelToken, sink: &mut F) -> u32
where
    F: FnMut(Frame),
{
    let params = &job.params;
    let (width, height) = params.pixel_grid();
    let plane = PlaneMapper::new(width, height, params.center, params.effective_scale());
    let colormap = Colormap::new(params.color);
    let mut image = RgbImage::new(width, height);
    let mut emitted = 0;

    let mut pass = 0;
    while pass < passes {
        let iterations = iteration_budget(pass);
        let started = Instant::now();
        let renderer = EscapeTimeRenderer::new(&plane, iterations);

        match renderer.render(&colormap, &mut image, token) {
            PassOutcome::Cancelled => {
                info!(connection = job.connection.0, pass, "job preempted");
                return emitted;
            }
            PassOutcome::Complete { escaped } => {
                if escaped == 0 && pass == 0 {
                    debug!(connection = job.connection.0, "first pass all interior, skipping ahead");
                    pass = ALL_INTERIOR_SKIP_TO;
                    continue;
                }
                let elapsed = started.elapsed();
                info!(
                    connection = job.connection.0,
                    pass,
                    iterations,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "pass rendered"
                );
                sink(Frame {
                    connection: job.connection,
                    image: image.clone(),
                    pass,
                    passes,
                    iterations,
                    elapsed,
                    scale_factor: params.scale_factor,
                });
                emitted += 1;
                pass += 1;
            }
        }
    }
    emitted
}
