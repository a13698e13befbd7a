//! Camera and view management.

use glam::{Mat4, Vec3};

/// Free-moving camera.
///
/// Translation only; orientation is fixed down the negative Z axis.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub fov_y_radians: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Units moved per input step along each pressed axis.
    pub move_speed: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, -6.0, -10.0),
            fov_y_radians: 70.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 200.0,
            move_speed: 0.1,
        }
    }
}

impl Camera {
    /// Set the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Translate along the world axes by one input step.
    ///
    /// `axes` components are expected in `{-1, 0, 1}` (horizontal, vertical,
    /// forward); the fixed move speed is applied here.
    pub fn apply_movement(&mut self, axes: Vec3) {
        self.position += axes * self.move_speed;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj =
            Mat4::perspective_rh(self.fov_y_radians, self.aspect, self.near, self.far);
        // GL-style clip space to Vulkan: flip Y
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Camera uniform buffer data for GPU.
///
/// One copy lives in each frame slot's camera buffer; a slot's copy is only
/// rewritten after that slot's fence wait has passed.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCameraData {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
}

impl From<&Camera> for GpuCameraData {
    fn from(camera: &Camera) -> Self {
        let view = camera.view_matrix();
        let proj = camera.projection_matrix();
        Self {
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            view_proj: (proj * view).to_cols_array_2d(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_scales_by_speed() {
        let mut camera = Camera {
            position: Vec3::ZERO,
            move_speed: 0.1,
            ..Default::default()
        };

        camera.apply_movement(Vec3::new(1.0, 0.0, -1.0));
        assert!((camera.position.x - 0.1).abs() < 1e-6);
        assert!((camera.position.y).abs() < 1e-6);
        assert!((camera.position.z + 0.1).abs() < 1e-6);

        // No input, no drift.
        camera.apply_movement(Vec3::ZERO);
        assert!((camera.position.x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = Camera::default();
        let flipped = camera.projection_matrix();
        let unflipped = Mat4::perspective_rh(
            camera.fov_y_radians,
            camera.aspect,
            camera.near,
            camera.far,
        );
        assert!((flipped.y_axis.y + unflipped.y_axis.y).abs() < 1e-6);
    }

    #[test]
    fn camera_data_layout() {
        assert_eq!(std::mem::size_of::<GpuCameraData>(), 192);
        assert_eq!(std::mem::offset_of!(GpuCameraData, view), 0);
        assert_eq!(std::mem::offset_of!(GpuCameraData, proj), 64);
        assert_eq!(std::mem::offset_of!(GpuCameraData, view_proj), 128);
    }
}
