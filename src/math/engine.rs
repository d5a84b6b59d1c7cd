use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

use crate::math::expr::{Evaluator, ExprEvaluator};
use crate::math::mesh::{DirtyBuffers, SurfaceMesh};
use crate::math::params::VisualizationParameters;
use crate::math::session::{RenderHost, Session};
use crate::math::surface::SurfaceError;

pub enum MathCommand {
    Apply {
        params: VisualizationParameters,
        animating: bool,
    },
    Stop,
}

/// Buffers to copy to the GPU. `None` means that buffer did not change.
#[derive(Debug, Clone)]
pub struct MeshUpload {
    pub vertices: Option<Vec<f32>>,
    pub normals: Option<Vec<f32>>,
    pub colors: Option<Vec<f32>>,
    pub indices: Option<Vec<u32>>,
    pub vertex_count: usize,
    pub index_count: usize,
    pub z_min: f32,
    pub z_max: f32,
}

impl MeshUpload {
    fn from_surface(surface: &SurfaceMesh, dirty: DirtyBuffers) -> Self {
        let mesh = &surface.mesh;
        let pick = |flag: DirtyBuffers, data: &Vec<f32>| dirty.contains(flag).then(|| data.clone());

        Self {
            vertices: pick(DirtyBuffers::POSITIONS, &mesh.vertices),
            normals: pick(DirtyBuffers::NORMALS, &mesh.normals),
            colors: pick(DirtyBuffers::COLORS, &mesh.colors),
            indices: dirty
                .contains(DirtyBuffers::INDICES)
                .then(|| mesh.indices.clone()),
            vertex_count: mesh.vertex_count(),
            index_count: mesh.indices.len(),
            z_min: surface.z_min,
            z_max: surface.z_max,
        }
    }
}

pub enum MathResult {
    /// A rebuilt surface replaces whatever was shown.
    Attached(MeshUpload),
    /// The live surface changed in place.
    Changed(MeshUpload),
    Disposed { resolution: u32 },
    Working(bool),
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("the surface worker has stopped")]
    Stopped,
}

/// Forwards session callbacks to the UI thread.
struct ChannelHost {
    tx_result: Sender<MathResult>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl RenderHost for ChannelHost {
    fn attach(&mut self, mesh: &SurfaceMesh) {
        let upload = MeshUpload::from_surface(mesh, DirtyBuffers::all());
        let _ = self.tx_result.send(MathResult::Attached(upload));
    }

    fn dispose(&mut self, mesh: SurfaceMesh) {
        let _ = self.tx_result.send(MathResult::Disposed {
            resolution: mesh.resolution(),
        });
    }

    fn buffers_changed(&mut self, mesh: &SurfaceMesh, dirty: DirtyBuffers) {
        let upload = MeshUpload::from_surface(mesh, dirty);
        let _ = self.tx_result.send(MathResult::Changed(upload));
    }

    fn set_working(&mut self, working: bool) {
        let _ = self.tx_result.send(MathResult::Working(working));
    }

    fn report_failure(&mut self, error: &SurfaceError) {
        let message = error.to_string();
        *self.last_error.lock() = Some(message.clone());
        let _ = self.tx_result.send(MathResult::Failed(message));
    }
}

impl ChannelHost {
    /// A pass died halfway; report it once and lower the working flag the
    /// session could not.
    fn report_crash(&mut self, message: String) {
        *self.last_error.lock() = Some(message.clone());
        let _ = self.tx_result.send(MathResult::Failed(message));
        let _ = self.tx_result.send(MathResult::Working(false));
    }
}

/// Runs the surface session on its own thread. Commands are processed in
/// order and never cancelled; a backlog of parameter changes collapses to the
/// newest one.
pub struct MathEngine {
    tx_cmd: Sender<MathCommand>,
    rx_result: Receiver<MathResult>,
    last_error: Arc<Mutex<Option<String>>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MathEngine {
    pub fn new() -> Self {
        Self::with_evaluator(ExprEvaluator::new())
    }

    pub fn with_evaluator<E: Evaluator + Send + 'static>(evaluator: E) -> Self {
        let (tx_cmd, rx_cmd) = channel::unbounded::<MathCommand>();
        // Unbounded so the worker never blocks on a UI thread that is
        // shutting down and waiting to join it.
        let (tx_result, rx_result) = channel::unbounded::<MathResult>();
        let last_error = Arc::new(Mutex::new(None));
        let last_error_clone = Arc::clone(&last_error);

        let thread_handle = thread::spawn(move || {
            math_thread(Session::new(evaluator), rx_cmd, tx_result, last_error_clone);
        });

        Self {
            tx_cmd,
            rx_result,
            last_error,
            thread_handle: Some(thread_handle),
        }
    }

    pub fn apply(
        &self,
        params: VisualizationParameters,
        animating: bool,
    ) -> Result<(), EngineError> {
        self.tx_cmd
            .send(MathCommand::Apply { params, animating })
            .map_err(|_| {
                log::error!(target: "surface3d::engine", "apply dropped, math thread is gone");
                EngineError::Stopped
            })
    }

    /// `Ok(None)` while the worker is busy or idle, `Err` once it is gone and
    /// every result it sent has been drained.
    pub fn try_recv_result(&self) -> Result<Option<MathResult>, EngineError> {
        match self.rx_result.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(EngineError::Stopped),
        }
    }

    #[cfg(test)]
    fn recv_timeout(&self, timeout: std::time::Duration) -> Option<MathResult> {
        self.rx_result.recv_timeout(timeout).ok()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn stop(&self) {
        let _ = self.tx_cmd.send(MathCommand::Stop);
    }
}

impl Default for MathEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MathEngine {
    fn drop(&mut self) {
        let _ = self.tx_cmd.send(MathCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Skips over queued `Apply` commands that a later one supersedes. A queued
/// `Stop` always wins.
fn latest_command(mut cmd: MathCommand, rx_cmd: &Receiver<MathCommand>) -> MathCommand {
    if matches!(cmd, MathCommand::Stop) {
        return cmd;
    }
    while let Ok(next) = rx_cmd.try_recv() {
        match next {
            MathCommand::Stop => return MathCommand::Stop,
            apply => cmd = apply,
        }
    }
    cmd
}

fn math_thread<E: Evaluator>(
    mut session: Session<E>,
    rx_cmd: Receiver<MathCommand>,
    tx_result: Sender<MathResult>,
    last_error: Arc<Mutex<Option<String>>>,
) {
    let mut host = ChannelHost {
        tx_result,
        last_error: Arc::clone(&last_error),
    };

    loop {
        let cmd = match rx_cmd.recv() {
            Ok(c) => latest_command(c, &rx_cmd),
            Err(_) => return,
        };

        match cmd {
            MathCommand::Apply { params, animating } => {
                *last_error.lock() = None;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    session.apply(params, animating, &mut host)
                }));
                match outcome {
                    Ok(transition) => {
                        log::trace!(target: "surface3d::engine", "apply -> {:?}", transition);
                    }
                    Err(payload) => {
                        let message =
                            format!("surface worker failed: {}", panic_message(payload.as_ref()));
                        log::error!(target: "surface3d::engine", "{}", message);
                        session.reset_after_crash();
                        host.report_crash(message);
                    }
                }
            }
            MathCommand::Stop => {
                log::debug!(target: "surface3d::engine", "math thread stopping");
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
