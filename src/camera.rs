use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::vulkan::Buffer;

const NEAR: f32 = 0.01;
const FAR: f32 = 8192.0;
const FOV: f32 = 45.0 * std::f32::consts::PI / 180.0;
const APERTURE: f32 = 0.0275;
const FOCUS_DISTANCE: f32 = 16.0;
const SMOOTH_MOVEMENT: f32 = 0.65;

const BOUNCE_COUNT: u32 = 12;
const SAMPLE_COUNT: u32 = 8;

const EPSILON: f32 = 0.001;

/// Layout shared with the raygen shader. 148 bytes, matrices column major.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CameraUniform {
    pub view: [f32; 16],
    pub projection_inverse: [f32; 16],
    pub aperture: f32,
    pub focus_distance: f32,
    pub sample_count: u32,
    pub total_sample_count: u32,
    pub bounce_count: u32,
}

/// Orbit camera with velocity damped rotation and zoom. Sample accumulation
/// restarts whenever the camera is still in motion.
pub struct Camera {
    projection_inverse: Mat4,
    rotation: [f32; 2],
    rotation_velocity: [f32; 2],
    distance: f32,
    distance_velocity: f32,
    pub sample_count: u32,
    pub bounce_count: u32,
    total_sample_count: u32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        let aspect = width as f32 / height as f32;
        let mut projection = Mat4::perspective_rh_gl(FOV, aspect, NEAR, FAR);
        // Vulkan's y axis is flipped
        projection.y_axis.y *= -1.0;
        let projection_inverse = projection.inverse();

        Self {
            projection_inverse,
            rotation: [25.0, 45.0],
            rotation_velocity: [0.0, 0.0],
            distance: -12.0,
            distance_velocity: 0.0,
            sample_count: SAMPLE_COUNT,
            bounce_count: BOUNCE_COUNT,
            total_sample_count: 0,
        }
    }

    pub fn total_sample_count(&self) -> u32 {
        self.total_sample_count
    }

    pub fn reset_sample_count(&mut self) {
        self.total_sample_count = self.sample_count;
    }

    /// Left drag input, in pixels of cursor movement.
    pub fn on_drag(&mut self, delta_x: f32, delta_y: f32) {
        self.rotation_velocity[0] += -delta_x * 0.725;
        self.rotation_velocity[1] += -delta_y * 0.725;
        self.reset_sample_count();
    }

    pub fn on_scroll(&mut self, delta: f32) {
        self.distance_velocity += delta;
        self.reset_sample_count();
    }

    /// Advances the orbit one frame and returns the uniform contents for it.
    pub fn tick(&mut self) -> CameraUniform {
        let model = Mat4::from_translation(glam::vec3(0.0, 0.0, self.distance))
            * Mat4::from_rotation_x(self.rotation[1].to_radians())
            * Mat4::from_rotation_y(self.rotation[0].to_radians());

        self.rotation[0] += self.rotation_velocity[0];
        self.rotation[1] += self.rotation_velocity[1];
        self.distance += self.distance_velocity;

        self.rotation_velocity[0] *= SMOOTH_MOVEMENT;
        self.rotation_velocity[1] *= SMOOTH_MOVEMENT;
        self.distance_velocity *= SMOOTH_MOVEMENT + 0.125;

        // accumulate only while the camera is completely at rest
        let speed = self.rotation_velocity[0].abs()
            + self.rotation_velocity[1].abs()
            + self.distance_velocity.abs();
        if speed != 0.0 {
            self.reset_sample_count();
        }

        for v in &mut self.rotation_velocity {
            if v.abs() < EPSILON {
                *v = 0.0;
            }
        }
        if self.distance_velocity.abs() < EPSILON {
            self.distance_velocity = 0.0;
        }

        let view = model.inverse();

        CameraUniform {
            view: view.to_cols_array(),
            projection_inverse: self.projection_inverse.to_cols_array(),
            aperture: APERTURE,
            focus_distance: FOCUS_DISTANCE,
            sample_count: self.sample_count,
            total_sample_count: self.total_sample_count,
            bounce_count: self.bounce_count,
        }
    }

    /// Writes the per frame uniform and grows the accumulator afterwards, so
    /// the shader sees the pre-frame total.
    pub fn update(&mut self, buffer: &Buffer) -> Result<()> {
        let uniform = self.tick();
        buffer.copy_data_to_buffer(std::slice::from_ref(&uniform))?;

        self.total_sample_count += self.sample_count;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn uniform_layout_is_148_bytes() {
        assert_eq!(size_of::<CameraUniform>(), 148);
        assert_eq!(offset_of!(CameraUniform, view), 0);
        assert_eq!(offset_of!(CameraUniform, projection_inverse), 64);
        assert_eq!(offset_of!(CameraUniform, aperture), 128);
        assert_eq!(offset_of!(CameraUniform, focus_distance), 132);
        assert_eq!(offset_of!(CameraUniform, sample_count), 136);
        assert_eq!(offset_of!(CameraUniform, total_sample_count), 140);
        assert_eq!(offset_of!(CameraUniform, bounce_count), 144);
    }

    #[test]
    fn accumulation_grows_while_at_rest() {
        let mut camera = Camera::new(640, 480);
        camera.reset_sample_count();

        let first = camera.tick();
        camera.total_sample_count += camera.sample_count;
        let second = camera.tick();
        camera.total_sample_count += camera.sample_count;
        let third = camera.tick();

        assert_eq!(first.total_sample_count, 8);
        assert_eq!(second.total_sample_count, 16);
        assert_eq!(third.total_sample_count, 24);
    }

    #[test]
    fn motion_resets_accumulation() {
        let mut camera = Camera::new(640, 480);
        camera.reset_sample_count();
        camera.total_sample_count += camera.sample_count * 10;

        camera.on_drag(3.0, 0.0);
        let uniform = camera.tick();

        assert_eq!(uniform.total_sample_count, camera.sample_count);
    }

    #[test]
    fn velocity_snaps_to_zero_below_epsilon() {
        let mut camera = Camera::new(640, 480);
        camera.rotation_velocity = [EPSILON / 2.0, 0.0];

        camera.tick();

        assert_eq!(camera.rotation_velocity, [0.0, 0.0]);

        // once at rest the accumulator is allowed to grow again
        let before = camera.tick().total_sample_count;
        camera.total_sample_count += camera.sample_count;
        let after = camera.tick().total_sample_count;
        assert_eq!(after, before + camera.sample_count);
    }

    #[test]
    fn reset_sample_count_is_idempotent() {
        let mut camera = Camera::new(640, 480);
        camera.reset_sample_count();
        let first = camera.total_sample_count();
        camera.reset_sample_count();
        assert_eq!(camera.total_sample_count(), first);
        assert_eq!(first, camera.sample_count);
    }

    #[test]
    fn per_frame_constants_match_the_shader_contract() {
        let mut camera = Camera::new(800, 600);
        let uniform = camera.tick();

        assert_eq!(uniform.aperture, APERTURE);
        assert_eq!(uniform.focus_distance, FOCUS_DISTANCE);
        assert_eq!(uniform.sample_count, 8);
        assert_eq!(uniform.bounce_count, 12);
    }
}
