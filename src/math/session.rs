use crate::math::expr::Evaluator;
use crate::math::mesh::{DirtyBuffers, SurfaceMesh};
use crate::math::params::VisualizationParameters;
use crate::math::surface::{self, SurfaceError};

/// Whatever owns the scene. The session hands it finished meshes and never
/// keeps a reference to one it has disposed.
pub trait RenderHost {
    /// A freshly built mesh becomes the live surface.
    fn attach(&mut self, mesh: &SurfaceMesh);

    /// The previous live mesh, released at replacement time.
    fn dispose(&mut self, mesh: SurfaceMesh);

    /// The live mesh was mutated in place; `dirty` names the buffers to resync.
    fn buffers_changed(&mut self, mesh: &SurfaceMesh, dirty: DirtyBuffers);

    fn set_working(&mut self, working: bool);

    fn report_failure(&mut self, error: &SurfaceError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Rebuilding,
    Updating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Rebuilt,
    Updated,
    /// Rebuild failed; the previous surface is still live.
    Failed,
    Unchanged,
}

/// Owns the live mesh and decides, per parameter change, between a full
/// rebuild and an in-place update.
pub struct Session<E> {
    evaluator: E,
    mesh: Option<SurfaceMesh>,
    applied: Option<VisualizationParameters>,
    state: SessionState,
}

impl<E: Evaluator> Session<E> {
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            mesh: None,
            applied: None,
            state: SessionState::Idle,
        }
    }

    /// Forgets what was applied after a pass died halfway, so the next
    /// request rebuilds from scratch. The live mesh stays until that rebuild
    /// disposes it.
    pub fn reset_after_crash(&mut self) {
        self.applied = None;
        self.state = SessionState::Idle;
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn mesh(&self) -> Option<&SurfaceMesh> {
        self.mesh.as_ref()
    }

    #[cfg(test)]
    pub fn applied(&self) -> Option<&VisualizationParameters> {
        self.applied.as_ref()
    }

    /// Structural changes (expression, range, resolution, scheme) rebuild.
    /// A time-only change updates in place while `animating`, and is ignored
    /// otherwise.
    pub fn apply<H: RenderHost + ?Sized>(
        &mut self,
        params: VisualizationParameters,
        animating: bool,
        host: &mut H,
    ) -> Transition {
        let structural = match (&self.mesh, &self.applied) {
            (Some(_), Some(applied)) => !applied.same_structure(&params),
            _ => true,
        };

        if structural {
            return self.rebuild(params, host);
        }

        let time_changed = self.applied.as_ref().is_some_and(|applied| applied.time != params.time);
        if animating && time_changed {
            self.update(params, host)
        } else {
            Transition::Unchanged
        }
    }

    pub fn rebuild<H: RenderHost + ?Sized>(
        &mut self,
        params: VisualizationParameters,
        host: &mut H,
    ) -> Transition {
        self.state = SessionState::Rebuilding;
        host.set_working(true);
        log::debug!(
            target: "surface3d::session",
            "rebuilding `{}` (range {}, resolution {}, {})",
            params.expression,
            params.range,
            params.resolution,
            params.scheme
        );

        let transition = match surface::build(&self.evaluator, &params) {
            Ok(mut mesh) => {
                // attaching uploads every buffer
                mesh.take_dirty();
                if let Some(old) = self.mesh.take() {
                    host.dispose(old);
                }
                host.attach(&mesh);
                self.mesh = Some(mesh);
                self.applied = Some(params);
                Transition::Rebuilt
            }
            Err(err) => {
                log::error!(target: "surface3d::session", "rebuild failed: {}", err);
                host.report_failure(&err);
                Transition::Failed
            }
        };

        host.set_working(false);
        self.state = SessionState::Idle;
        transition
    }

    fn update<H: RenderHost + ?Sized>(
        &mut self,
        params: VisualizationParameters,
        host: &mut H,
    ) -> Transition {
        let Some(mesh) = self.mesh.as_mut() else {
            return self.rebuild(params, host);
        };

        self.state = SessionState::Updating;
        let result = surface::update(mesh, &self.evaluator, &params);
        self.state = SessionState::Idle;

        match result {
            Ok(()) => {
                let dirty = mesh.take_dirty();
                host.buffers_changed(mesh, dirty);
                self.applied = Some(params);
                Transition::Updated
            }
            Err(SurfaceError::TopologyMismatch { .. }) => {
                log::debug!(
                    target: "surface3d::session",
                    "topology changed under an update, rebuilding"
                );
                self.rebuild(params, host)
            }
            Err(err) => {
                log::error!(target: "surface3d::session", "update failed: {}", err);
                host.report_failure(&err);
                Transition::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::color::ColorScheme;
    use crate::math::expr::ExprEvaluator;
    use test_log::test;

    #[derive(Debug, PartialEq)]
    enum Event {
        Working(bool),
        Attach(u32),
        Dispose(u32),
        Changed(DirtyBuffers),
        Failure,
    }

    #[derive(Default)]
    struct RecordingHost {
        events: Vec<Event>,
    }

    impl RenderHost for RecordingHost {
        fn attach(&mut self, mesh: &SurfaceMesh) {
            self.events.push(Event::Attach(mesh.resolution()));
        }

        fn dispose(&mut self, mesh: SurfaceMesh) {
            self.events.push(Event::Dispose(mesh.resolution()));
        }

        fn buffers_changed(&mut self, _mesh: &SurfaceMesh, dirty: DirtyBuffers) {
            self.events.push(Event::Changed(dirty));
        }

        fn set_working(&mut self, working: bool) {
            self.events.push(Event::Working(working));
        }

        fn report_failure(&mut self, _error: &SurfaceError) {
            self.events.push(Event::Failure);
        }
    }

    fn params(resolution: u32) -> VisualizationParameters {
        VisualizationParameters::new("sin(x + t) * cos(y)", 3.0, resolution)
    }

    #[test]
    fn first_apply_builds() {
        let mut session = Session::new(ExprEvaluator::new());
        let mut host = RecordingHost::default();

        assert_eq!(session.apply(params(4), true, &mut host), Transition::Rebuilt);
        assert_eq!(
            host.events,
            vec![Event::Working(true), Event::Attach(4), Event::Working(false)]
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.mesh().is_some());
    }

    #[test]
    fn structural_change_disposes_the_old_mesh() {
        let mut session = Session::new(ExprEvaluator::new());
        let mut host = RecordingHost::default();
        session.apply(params(4), true, &mut host);
        host.events.clear();

        assert_eq!(session.apply(params(8), true, &mut host), Transition::Rebuilt);
        assert_eq!(
            host.events,
            vec![
                Event::Working(true),
                Event::Dispose(4),
                Event::Attach(8),
                Event::Working(false)
            ]
        );
    }

    #[test]
    fn scheme_change_rebuilds() {
        let mut session = Session::new(ExprEvaluator::new());
        let mut host = RecordingHost::default();
        session.apply(params(4), true, &mut host);

        let recolored = params(4).with_scheme(ColorScheme::Rainbow);
        assert_eq!(session.apply(recolored, false, &mut host), Transition::Rebuilt);
        assert_eq!(session.mesh().map(SurfaceMesh::scheme), Some(ColorScheme::Rainbow));
    }

    #[test]
    fn time_change_while_animating_updates_in_place() {
        let mut session = Session::new(ExprEvaluator::new());
        let mut host = RecordingHost::default();
        session.apply(params(4), true, &mut host);
        host.events.clear();

        assert_eq!(
            session.apply(params(4).with_time(1.0), true, &mut host),
            Transition::Updated
        );
        assert_eq!(host.events, vec![Event::Changed(DirtyBuffers::VERTEX_DATA)]);
        assert_eq!(session.applied().map(|p| p.time), Some(1.0));
    }

    #[test]
    fn time_change_without_animation_is_ignored() {
        let mut session = Session::new(ExprEvaluator::new());
        let mut host = RecordingHost::default();
        session.apply(params(4), false, &mut host);
        host.events.clear();

        assert_eq!(
            session.apply(params(4).with_time(2.0), false, &mut host),
            Transition::Unchanged
        );
        assert!(host.events.is_empty());
        assert_eq!(session.applied().map(|p| p.time), Some(0.0));
    }

    #[test]
    fn failed_rebuild_keeps_the_previous_surface() {
        let mut session = Session::new(ExprEvaluator::new());
        let mut host = RecordingHost::default();
        session.apply(params(4), true, &mut host);
        host.events.clear();

        assert_eq!(session.apply(params(2_000), true, &mut host), Transition::Failed);
        assert_eq!(
            host.events,
            vec![Event::Working(true), Event::Failure, Event::Working(false)]
        );
        assert_eq!(session.mesh().map(SurfaceMesh::resolution), Some(4));
        assert_eq!(session.applied().map(|p| p.resolution), Some(4));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn update_on_a_different_grid_rebuilds_instead() {
        let mut session = Session::new(ExprEvaluator::new());
        let mut host = RecordingHost::default();
        session.apply(params(4), true, &mut host);
        host.events.clear();

        assert_eq!(
            session.update(params(6).with_time(1.0), &mut host),
            Transition::Rebuilt
        );
        assert_eq!(
            host.events,
            vec![
                Event::Working(true),
                Event::Dispose(4),
                Event::Attach(6),
                Event::Working(false)
            ]
        );
        assert_eq!(session.applied().map(|p| p.resolution), Some(6));
    }

    #[test]
    fn failed_first_build_leaves_no_mesh() {
        let mut session = Session::new(ExprEvaluator::new());
        let mut host = RecordingHost::default();

        let mut bad = params(4);
        bad.range = 0.0;
        assert_eq!(session.apply(bad, true, &mut host), Transition::Failed);
        assert!(session.mesh().is_none());

        // the next valid request still builds
        assert_eq!(session.apply(params(4), true, &mut host), Transition::Rebuilt);
    }
}
