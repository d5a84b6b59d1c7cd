use glam::{Mat4, Vec2, Vec3};

pub const DEFAULT_EYE: Vec3 = Vec3::new(10.0, 8.0, 10.0);
pub const MIN_DISTANCE: f32 = 5.0;
pub const MAX_DISTANCE: f32 = 50.0;

const MAX_PITCH_DEG: f32 = 85.0;

/// Orbits `target` on a sphere of radius `distance`.
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,

    pub target: Vec3,
    pub distance: f32,

    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,

    pub rotate_sensitivity: f32,
    pub zoom_factor: f32,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            position: DEFAULT_EYE,
            yaw: 0.0,
            pitch: 0.0,

            target: Vec3::ZERO,
            distance: 0.0,

            fov: 50.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,

            rotate_sensitivity: 0.005,
            zoom_factor: 0.9,
        };
        camera.look_from(DEFAULT_EYE);
        camera
    }
}

impl Camera {
    /// Places the eye at `eye`, keeping the current target.
    pub fn look_from(&mut self, eye: Vec3) {
        let offset = eye - self.target;
        self.distance = offset.length().clamp(MIN_DISTANCE, MAX_DISTANCE);
        let dir = offset.normalize_or(Vec3::Z);
        self.yaw = dir.z.atan2(dir.x);
        self.pitch = dir.y.asin();
        self.update_position();
    }

    pub fn reset(&mut self) {
        self.target = Vec3::ZERO;
        self.look_from(DEFAULT_EYE);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Drag in pixels. Dragging right swings the eye around the target,
    /// dragging down raises it.
    pub fn process_mouse_movement(&mut self, delta: Vec2) {
        self.yaw += delta.x * self.rotate_sensitivity;
        self.pitch += delta.y * self.rotate_sensitivity;

        let max_pitch = MAX_PITCH_DEG.to_radians();
        self.pitch = self.pitch.clamp(-max_pitch, max_pitch);

        self.update_position();
    }

    /// Positive `delta` zooms in.
    pub fn process_scroll(&mut self, delta: f32) {
        self.distance =
            (self.distance * self.zoom_factor.powf(delta)).clamp(MIN_DISTANCE, MAX_DISTANCE);
        self.update_position();
    }

    fn update_position(&mut self) {
        self.position = self.target
            + Vec3::new(
                self.distance * self.yaw.cos() * self.pitch.cos(),
                self.distance * self.pitch.sin(),
                self.distance * self.yaw.sin() * self.pitch.cos(),
            );
    }

    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect = width / height;
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub _padding: f32,
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj: camera.view_projection_matrix().to_cols_array_2d(),
            camera_pos: camera.position.to_array(),
            _padding: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn starts_at_the_default_eye() {
        let camera = Camera::default();
        assert!(camera.position.abs_diff_eq(DEFAULT_EYE, 1e-4), "{}", camera.position);
        assert!((camera.distance - DEFAULT_EYE.length()).abs() < 1e-4);
    }

    #[test]
    fn zoom_is_bounded() {
        let mut camera = Camera::default();
        camera.process_scroll(1_000.0);
        assert_eq!(camera.distance, MIN_DISTANCE);
        camera.process_scroll(-1_000.0);
        assert_eq!(camera.distance, MAX_DISTANCE);
        assert!((camera.position.length() - MAX_DISTANCE).abs() < 1e-3);
    }

    #[test]
    fn pitch_never_flips_over_the_pole() {
        let mut camera = Camera::default();
        camera.process_mouse_movement(Vec2::new(0.0, 100_000.0));
        assert!(camera.pitch <= MAX_PITCH_DEG.to_radians());
        assert!(camera.position.y < camera.distance);
    }

    #[test]
    fn reset_restores_the_default_view() {
        let mut camera = Camera::default();
        camera.process_mouse_movement(Vec2::new(300.0, -50.0));
        camera.process_scroll(4.0);
        camera.reset();
        assert!(camera.position.abs_diff_eq(DEFAULT_EYE, 1e-4));
    }
}
