//! # Free-fly Camera
//!
//! Position plus yaw/pitch in degrees. Yaw 0 and pitch 0 look down -Z with +Y
//! up, matching the right-handed view space [`Mat4Ext::look_at`] produces.
//! The projection folds in [`Mat4Ext::vulkan_coordinate_transform`], so the
//! shader only computes `projection * view * model`.

use bytemuck::{Pod, Zeroable};

use crate::config::CameraConfig;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::input::InputState;

const PITCH_LIMIT_DEGREES: f32 = 89.0;

/// Camera block pushed to the vertex stage every frame
///
/// Layout matches a std430 push-constant block of
/// `vec3 + pad, vec3 + pad, mat4, mat4`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraPushConstants {
    /// World-space eye position
    pub position: [f32; 3],
    _pad0: f32,
    /// Unit view direction
    pub view_direction: [f32; 3],
    _pad1: f32,
    /// View matrix, column-major
    pub view: [[f32; 4]; 4],
    /// Projection matrix (Vulkan clip space), column-major
    pub projection: [[f32; 4]; 4],
}

impl CameraPushConstants {
    /// Raw bytes for `vkCmdPushConstants`
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Free-fly perspective camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position in world space
    pub position: Vec3,
    /// Rotation about +Y in degrees; 0 looks down -Z
    pub yaw: f32,
    /// Elevation in degrees, clamped to +-89
    pub pitch: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Camera {
    /// Camera at the configured start position looking down -Z
    pub fn from_config(config: &CameraConfig) -> Self {
        let [x, y, z] = config.start_position;
        Self {
            position: Vec3::new(x, y, z),
            yaw: 0.0,
            pitch: 0.0,
            fov_degrees: config.fov_degrees,
            near: config.near,
            far: config.far,
        }
    }

    /// Unit forward vector
    pub fn view_direction(&self) -> Vec3 {
        let yaw = utils::deg_to_rad(self.yaw);
        let pitch = utils::deg_to_rad(self.pitch);
        Vec3::new(pitch.cos() * yaw.sin(), pitch.sin(), -pitch.cos() * yaw.cos())
    }

    /// Unit vector to the camera's right, in the horizontal plane
    pub fn right(&self) -> Vec3 {
        self.view_direction().cross(&Vec3::y()).normalize()
    }

    /// Right-handed view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.position + self.view_direction(), Vec3::y())
    }

    /// Perspective with Vulkan depth range and Y-down clip space
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective(utils::deg_to_rad(self.fov_degrees), aspect, self.near, self.far)
            * Mat4::vulkan_coordinate_transform()
    }

    /// Advance by one frame of input
    ///
    /// Dragging rotates by `rotation_speed` degrees per pixel, held keys move
    /// `move_speed` units per second, and each wheel notch dollies
    /// `wheel_speed_scale` units along the view direction.
    #[must_use]
    pub fn update(&self, input: &InputState, dt: f32, settings: &CameraConfig) -> Self {
        let mut next = *self;

        let (dx, dy) = input.drag_delta;
        next.yaw += dx * settings.rotation_speed;
        next.pitch = (next.pitch - dy * settings.rotation_speed).clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);

        let forward = next.view_direction();
        let right = next.right();
        let (strafe, advance) = input.movement_axes();
        let step = settings.move_speed * dt;

        next.position += right * (strafe * step);
        next.position += forward * (advance * step);
        next.position += forward * (input.wheel_delta * settings.wheel_speed_scale);

        next
    }

    /// Push-constant block for a target of the given aspect ratio
    pub fn push_constants(&self, aspect: f32) -> CameraPushConstants {
        CameraPushConstants {
            position: self.position.into(),
            _pad0: 0.0,
            view_direction: self.view_direction().into(),
            _pad1: 0.0,
            view: self.view_matrix().into(),
            projection: self.projection_matrix(aspect).into(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Point3, Vec4};
    use crate::input::{InputEvent, MoveDirection};
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_push_constant_block_is_160_bytes() {
        assert_eq!(std::mem::size_of::<CameraPushConstants>(), 160);
        assert_eq!(std::mem::align_of::<CameraPushConstants>(), 4);
        let block = Camera::default().push_constants(1.0);
        assert_eq!(block.as_bytes().len(), 160);
    }

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        let forward = camera.view_direction();
        assert_relative_eq!(forward.x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(forward.z, -1.0, epsilon = EPSILON);

        let origin = camera.view_matrix().transform_point(&Point3::origin());
        assert_relative_eq!(origin.z, -3.0, epsilon = EPSILON);
    }

    #[test]
    fn test_origin_projects_inside_clip_volume() {
        let camera = Camera::default();
        let clip = camera.projection_matrix(1.0) * camera.view_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc_z = clip.z / clip.w;
        assert!(clip.w > 0.0);
        assert!((0.0..=1.0).contains(&ndc_z), "depth {}", ndc_z);
    }

    #[test]
    fn test_forward_key_moves_at_configured_speed() {
        let settings = CameraConfig::default();
        let input = InputState::default().apply(&InputEvent::Key { direction: MoveDirection::Forward, pressed: true });
        let moved = Camera::default().update(&input, 0.5, &settings);
        assert_relative_eq!(moved.position.z, 3.0 - 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_drag_rotates_and_pitch_is_clamped() {
        let settings = CameraConfig::default();
        let input = InputState {
            drag_delta: (100.0, -5000.0),
            ..InputState::default()
        };
        let rotated = Camera::default().update(&input, 0.0, &settings);
        assert_relative_eq!(rotated.yaw, 10.0, epsilon = EPSILON);
        assert_relative_eq!(rotated.pitch, PITCH_LIMIT_DEGREES, epsilon = EPSILON);
    }

    #[test]
    fn test_wheel_dollies_along_view_direction() {
        let settings = CameraConfig::default();
        let input = InputState {
            wheel_delta: 2.0,
            ..InputState::default()
        };
        let moved = Camera::default().update(&input, 0.016, &settings);
        assert_relative_eq!(moved.position.z, 3.0 - 0.6, epsilon = EPSILON);
        assert_relative_eq!(moved.position.x, 0.0, epsilon = EPSILON);
    }
}
