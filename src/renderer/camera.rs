use ash::vk;
use glam::{Mat4, Vec3};
use crate::renderer::shader_data::CameraData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in degrees
    Perspective { fov_y_deg: f32 },
    /// Horizontal extent fixed to [-1, 1], vertical extent follows the aspect ratio
    Orthographic,
}

/// Fixed-position camera looking at a target. Both matrices are pure functions of
/// the camera's constants and the target extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    eye: Vec3,
    target: Vec3,
    up: Vec3,
    projection: Projection,
    near: f32,
    far: f32,
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 45.0;
    const NEAR: f32 = 0.1;
    const FAR: f32 = 1000.0;

    /// Perspective camera for the 3D scene
    pub fn world() -> Self {
        Self {
            eye: Vec3::new(5.0, 5.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            projection: Projection::Perspective {
                fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            },
            near: Self::NEAR,
            far: Self::FAR,
        }
    }

    /// Orthographic camera for screen-space overlays
    pub fn ui() -> Self {
        Self {
            eye: Vec3::new(0.0, 10.0, 0.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            projection: Projection::Orthographic,
            near: Self::NEAR,
            far: Self::FAR,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self, extent: vk::Extent2D) -> Mat4 {
        let width = extent.width.max(1) as f32;
        let height = extent.height.max(1) as f32;
        match self.projection {
            Projection::Perspective { fov_y_deg } => {
                let mut proj = Mat4::perspective_rh(
                    fov_y_deg.to_radians(),
                    width / height,
                    self.near,
                    self.far,
                );
                // Vulkan clip space has Y pointing down
                proj.y_axis.y *= -1.0;
                proj
            }
            Projection::Orthographic => {
                let half_height = height / width;
                Mat4::orthographic_rh(
                    -1.0,
                    1.0,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
        }
    }

    pub fn shader_data(&self, extent: vk::Extent2D) -> CameraData {
        CameraData {
            view: self.view_matrix(),
            proj: self.projection_matrix(extent),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn world_view_is_reproducible() {
        let a = Camera::world().shader_data(extent(800, 600));
        let b = Camera::world().shader_data(extent(800, 600));
        assert_eq!(bytemuck::bytes_of(&a), bytemuck::bytes_of(&b));
    }

    #[test]
    fn world_projection_flips_y() {
        let proj = Camera::world().projection_matrix(extent(800, 600));
        assert!(proj.y_axis.y < 0.0);
        assert!(proj.x_axis.x > 0.0);
    }

    #[test]
    fn ui_horizontal_extent_is_unit() {
        for (width, height) in [(800, 600), (1920, 1080), (300, 900)] {
            let proj = Camera::ui().projection_matrix(extent(width, height));
            let right = proj * Vec4::new(1.0, 0.0, -1.0, 1.0);
            let left = proj * Vec4::new(-1.0, 0.0, -1.0, 1.0);
            assert!((right.x - 1.0).abs() < 1e-6);
            assert!((left.x + 1.0).abs() < 1e-6);

            let top = proj * Vec4::new(0.0, height as f32 / width as f32, -1.0, 1.0);
            assert!((top.y - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn ui_depth_range_is_zero_to_one() {
        let proj = Camera::ui().projection_matrix(extent(800, 600));
        let near = proj * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -1000.0, 1.0);
        assert!(near.z.abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ui_camera_looks_down_y() {
        let view = Camera::ui().view_matrix();
        let origin = view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // The origin sits straight ahead of the eye, ten units away
        assert!(origin.x.abs() < 1e-6);
        assert!(origin.y.abs() < 1e-6);
        assert!((origin.z + 10.0).abs() < 1e-5);
    }
}
