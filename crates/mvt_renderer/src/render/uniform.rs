//! Per-frame uniform block shared with the vertex stage

use nalgebra::{Matrix4, Point3, Vector3};

/// Model, view and projection matrices, column-major, 192 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformBufferObject {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// World to camera
    pub view: [[f32; 4]; 4],
    /// Camera to clip space, Y flipped for Vulkan
    pub proj: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for UniformBufferObject {}
unsafe impl bytemuck::Zeroable for UniformBufferObject {}

impl UniformBufferObject {
    /// Camera position the scene is looked at from
    pub const EYE: [f32; 3] = [2.0, 2.0, 2.0];
    /// Vertical field of view in degrees
    pub const FOV_Y_DEGREES: f32 = 45.0;
    /// Near clip plane
    pub const NEAR: f32 = 0.1;
    /// Far clip plane
    pub const FAR: f32 = 10.0;

    /// Build the matrices from raw nalgebra values
    pub fn new(model: Matrix4<f32>, view: Matrix4<f32>, proj: Matrix4<f32>) -> Self {
        Self {
            model: model.into(),
            view: view.into(),
            proj: proj.into(),
        }
    }

    /// The spinning scene: a quarter turn per second around +Z, seen from
    /// [`Self::EYE`] with +Z up
    pub fn spinning(elapsed_secs: f32, aspect_ratio: f32) -> Self {
        let model = Matrix4::from_axis_angle(&Vector3::z_axis(), elapsed_secs * 90.0_f32.to_radians());
        let view = Matrix4::look_at_rh(
            &Point3::from(Self::EYE),
            &Point3::origin(),
            &Vector3::z(),
        );
        let mut proj = Matrix4::new_perspective(
            aspect_ratio,
            Self::FOV_Y_DEGREES.to_radians(),
            Self::NEAR,
            Self::FAR,
        );
        // Vulkan clip space has Y pointing down
        proj[(1, 1)] *= -1.0;

        Self::new(model, view, proj)
    }

    /// Raw bytes as copied into the mapped buffer
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn column_major(m: &[[f32; 4]; 4]) -> Matrix4<f32> {
        Matrix4::from_fn(|row, col| m[col][row])
    }

    #[test]
    fn test_layout_is_three_matrices() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 192);
        let ubo = UniformBufferObject::spinning(0.0, 1.0);
        assert_eq!(ubo.as_bytes().len(), 192);
    }

    #[test]
    fn test_projection_y_is_flipped() {
        let ubo = UniformBufferObject::spinning(0.0, 16.0 / 9.0);
        let expected = -1.0 / (22.5_f32.to_radians()).tan();
        assert_relative_eq!(ubo.proj[1][1], expected, epsilon = 1e-5);
        assert!(ubo.proj[0][0] > 0.0);
    }

    #[test]
    fn test_model_rotates_quarter_turn_per_second() {
        let ubo = UniformBufferObject::spinning(1.0, 1.0);
        let rotated = column_major(&ubo.model) * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(rotated, Vector4::new(0.0, 1.0, 0.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_view_moves_eye_to_origin() {
        let ubo = UniformBufferObject::spinning(0.0, 1.0);
        let view = column_major(&ubo.view);
        let eye = view * Vector4::new(2.0, 2.0, 2.0, 1.0);
        assert_relative_eq!(eye, Vector4::new(0.0, 0.0, 0.0, 1.0), epsilon = 1e-5);

        // The look-at target sits straight ahead on -Z
        let target = view * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(target.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.y, 0.0, epsilon = 1e-5);
        assert!(target.z < 0.0);
    }
}
