use glam::{Mat4, Quat, Vec3};

/// View and projection matrices supplied by the host camera.
///
/// Projections follow the wgpu clip convention (depth 0..1), e.g.
/// `Mat4::perspective_rh`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub view: Mat4,
    pub projection: Mat4,
}

impl Camera {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, projection: Mat4) -> Self {
        Self::new(Mat4::look_at_rh(eye, target, up), projection)
    }

    /// World-space position, taken from the inverse view matrix.
    pub fn position(&self) -> Vec3 {
        self.view.inverse().w_axis.truncate()
    }

    /// World-space orientation, taken from the inverse view matrix.
    pub fn orientation(&self) -> Quat {
        let (_, rotation, _) = self.view.inverse().to_scale_rotation_translation();
        rotation
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_recovered_from_view() {
        let cam = Camera::look_at(Vec3::new(3.0, 4.0, 5.0), Vec3::ZERO, Vec3::Y, Mat4::IDENTITY);
        assert!(cam.position().abs_diff_eq(Vec3::new(3.0, 4.0, 5.0), 1e-4));
    }

    #[test]
    fn orientation_maps_forward_to_view_direction() {
        let cam = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, Mat4::IDENTITY);
        let forward = cam.orientation() * Vec3::NEG_Z;
        assert!(forward.abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }
}
