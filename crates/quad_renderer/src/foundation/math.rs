//! Math utilities and types
//!
//! nalgebra aliases plus the small camera used to build the view-projection
//! uniform. Matrices follow Vulkan clip conventions: Y points down and depth
//! maps to `[0, 1]`.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Perspective projection with depth mapped to `[0, 1]`
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let tan_half_fovy = (fov_y * 0.5).tan();

    let mut result = Mat4::zeros();
    result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
    result[(1, 1)] = 1.0 / tan_half_fovy;
    result[(2, 2)] = far / (far - near);
    result[(2, 3)] = -(near * far) / (far - near);
    result[(3, 2)] = 1.0;
    result
}

/// Right-handed look-at view matrix
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    let forward = (target - eye).normalize();
    let right = forward.cross(&up).normalize();
    let camera_up = right.cross(&forward);

    let translation = Mat4::new(
        1.0, 0.0, 0.0, -eye.x,
        0.0, 1.0, 0.0, -eye.y,
        0.0, 0.0, 1.0, -eye.z,
        0.0, 0.0, 0.0, 1.0,
    );

    let rotation = Mat4::new(
        right.x, right.y, right.z, 0.0,
        camera_up.x, camera_up.y, camera_up.z, 0.0,
        -forward.x, -forward.y, -forward.z, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );

    rotation * translation
}

/// Flips Y and Z so a right-handed view space lands in Vulkan's Y-down, Z-forward clip space
pub fn vulkan_coordinate_transform() -> Mat4 {
    Mat4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0, 0.0, -1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Perspective camera looking at a fixed target
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Eye position in world space
    pub position: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// World up direction
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Width over height
    pub aspect: f32,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
}

impl Camera {
    /// Camera that frames the quads: a quarter turn field of view, slightly
    /// off axis at `(1, 0, -0.1)` and aimed at the origin.
    pub fn quad_viewer(aspect: f32) -> Self {
        Self {
            position: Vec3::new(1.0, 0.0, -0.1),
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov_y: 0.5 * std::f32::consts::PI,
            aspect,
            near: 0.1,
            far: 100.0,
        }
    }

    /// World to view transform
    pub fn view_matrix(&self) -> Mat4 {
        look_at(self.position, self.target, self.up)
    }

    /// View to clip transform, including the Vulkan axis flip
    pub fn projection_matrix(&self) -> Mat4 {
        perspective(self.fov_y, self.aspect, self.near, self.far) * vulkan_coordinate_transform()
    }

    /// Combined world to clip transform
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn to_ndc(matrix: &Mat4, point: Vec3) -> Vec3 {
        let clip = matrix * Vector4::new(point.x, point.y, point.z, 1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn test_target_projects_to_center() {
        let camera = Camera::quad_viewer(1280.0 / 720.0);
        let ndc = to_ndc(&camera.view_projection(), camera.target);
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_world_up_is_screen_up() {
        let camera = Camera::quad_viewer(1.0);
        let ndc = to_ndc(&camera.view_projection(), Vec3::new(0.0, 0.5, 0.0));
        assert!(ndc.y < 0.0, "Vulkan clip space has Y pointing down");
    }

    #[test]
    fn test_depth_range() {
        let projection = perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let near = projection * Vector4::new(0.0, 0.0, 0.1, 1.0);
        let far = projection * Vector4::new(0.0, 0.0, 100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }
}
