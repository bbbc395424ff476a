//! First-person camera and the input it integrates.
//!
//! The camera is stored as position + look-at target. View and projection are
//! rebuilt from scratch on every change, never accumulated.

use std::f32::consts::FRAC_PI_2;

use cgmath::{InnerSpace, Rotation, Rotation3};
use winit::{
    event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

/// cgmath produces OpenGL clip space (z in -1..1); wgpu wants 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Pitch never gets closer than this to straight up or down.
pub const PITCH_MARGIN: f32 = 0.1;
pub const MAX_PITCH: f32 = FRAC_PI_2 - PITCH_MARGIN;

const WORLD_UP: cgmath::Vector3<f32> = cgmath::Vector3::new(0.0, 1.0, 0.0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraConfig {
    pub fovy: cgmath::Deg<f32>,
    pub znear: f32,
    pub zfar: f32,
    /// Units per second.
    pub move_speed: f32,
    /// Radians per second for arrow-key look.
    pub look_speed: f32,
    /// Radians per pixel of mouse motion.
    pub mouse_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fovy: cgmath::Deg(60.0),
            znear: 0.1,
            zfar: 1000.0,
            move_speed: 8.0,
            look_speed: 1.5,
            mouse_sensitivity: 0.0025,
        }
    }
}

/// Keyboard and mouse state sampled by [`Camera::update`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub look_left: bool,
    pub look_right: bool,
    pub look_up: bool,
    pub look_down: bool,
    /// Accumulated mouse motion in pixels since the last update.
    pub mouse_delta: (f32, f32),
    /// Mouse motion only counts while this is set (right button held).
    pub mouse_look: bool,
}

impl InputState {
    pub fn has_input(&self) -> bool {
        self.forward
            || self.backward
            || self.left
            || self.right
            || self.look_left
            || self.look_right
            || self.look_up
            || self.look_down
            || self.mouse_delta != (0.0, 0.0)
    }

    pub fn set_key(&mut self, key: KeyCode, pressed: bool) -> bool {
        let flag = match key {
            KeyCode::KeyW => &mut self.forward,
            KeyCode::KeyS => &mut self.backward,
            KeyCode::KeyA => &mut self.left,
            KeyCode::KeyD => &mut self.right,
            KeyCode::ArrowLeft => &mut self.look_left,
            KeyCode::ArrowRight => &mut self.look_right,
            KeyCode::ArrowUp => &mut self.look_up,
            KeyCode::ArrowDown => &mut self.look_down,
            _ => return false,
        };
        *flag = pressed;
        true
    }

    /// Returns whether the event was consumed.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => self.set_key(*key, *state == ElementState::Pressed),
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state,
                ..
            } => {
                self.mouse_look = *state == ElementState::Pressed;
                true
            }
            WindowEvent::Focused(false) => {
                *self = Self::default();
                false
            }
            _ => false,
        }
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.mouse_look {
                self.mouse_delta.0 += *dx as f32;
                self.mouse_delta.1 += *dy as f32;
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    position: cgmath::Point3<f32>,
    target: cgmath::Point3<f32>,
    up: cgmath::Vector3<f32>,
    fovy: cgmath::Rad<f32>,
    aspect: f32,
    znear: f32,
    zfar: f32,
    pub move_speed: f32,
    pub look_speed: f32,
    pub mouse_sensitivity: f32,
    view: cgmath::Matrix4<f32>,
    projection: cgmath::Matrix4<f32>,
}

impl Camera {
    pub fn new(
        position: cgmath::Point3<f32>,
        target: cgmath::Point3<f32>,
        aspect: f32,
        config: CameraConfig,
    ) -> Self {
        let mut camera = Self {
            position,
            target,
            up: WORLD_UP,
            fovy: config.fovy.into(),
            aspect,
            znear: config.znear,
            zfar: config.zfar,
            move_speed: config.move_speed,
            look_speed: config.look_speed,
            mouse_sensitivity: config.mouse_sensitivity,
            view: cgmath::Matrix4::from_scale(1.0),
            projection: cgmath::Matrix4::from_scale(1.0),
        };
        camera.update_view();
        camera.update_projection();
        camera
    }

    pub fn position(&self) -> cgmath::Point3<f32> {
        self.position
    }

    pub fn target(&self) -> cgmath::Point3<f32> {
        self.target
    }

    pub fn up(&self) -> cgmath::Vector3<f32> {
        self.up
    }

    pub fn fovy(&self) -> cgmath::Rad<f32> {
        self.fovy
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn znear(&self) -> f32 {
        self.znear
    }

    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    pub fn view(&self) -> cgmath::Matrix4<f32> {
        self.view
    }

    pub fn projection(&self) -> cgmath::Matrix4<f32> {
        self.projection
    }

    pub fn view_proj(&self) -> cgmath::Matrix4<f32> {
        self.projection * self.view
    }

    pub fn forward(&self) -> cgmath::Vector3<f32> {
        (self.target - self.position).normalize()
    }

    pub fn right(&self) -> cgmath::Vector3<f32> {
        horizontal_right(self.forward())
    }

    /// Elevation of the look direction, in radians.
    pub fn pitch(&self) -> f32 {
        self.forward().y.clamp(-1.0, 1.0).asin()
    }

    /// Half of the horizontal field of view, in radians.
    pub fn half_horizontal_fov(&self) -> f32 {
        ((self.fovy.0 * 0.5).tan() * self.aspect).atan()
    }

    pub fn set_position(&mut self, position: cgmath::Point3<f32>) {
        self.position = position;
        self.update_view();
    }

    pub fn set_target(&mut self, target: cgmath::Point3<f32>) {
        self.target = target;
        self.update_view();
    }

    pub fn look_at(&mut self, position: cgmath::Point3<f32>, target: cgmath::Point3<f32>) {
        self.position = position;
        self.target = target;
        self.update_view();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 && aspect != self.aspect {
            self.aspect = aspect;
            self.update_projection();
        }
    }

    pub fn set_fovy(&mut self, fovy: impl Into<cgmath::Rad<f32>>) {
        self.fovy = fovy.into();
        self.update_projection();
    }

    /// Integrates one frame of input. Returns whether the camera changed.
    ///
    /// Mouse look wins over the arrow keys; the two are never combined.
    pub fn update(&mut self, dt: f32, input: &mut InputState) -> bool {
        if !input.has_input() {
            return false;
        }
        let mouse = std::mem::take(&mut input.mouse_delta);

        let mut forward = self.forward();
        let distance = (self.target - self.position).magnitude().max(f32::EPSILON);

        let (yaw, pitch) = if mouse != (0.0, 0.0) {
            (
                -mouse.0 * self.mouse_sensitivity,
                -mouse.1 * self.mouse_sensitivity,
            )
        } else {
            let axis = |pos: bool, neg: bool| (pos as i32 - neg as i32) as f32;
            (
                axis(input.look_left, input.look_right) * self.look_speed * dt,
                axis(input.look_up, input.look_down) * self.look_speed * dt,
            )
        };

        if yaw != 0.0 {
            forward = cgmath::Quaternion::from_axis_angle(WORLD_UP, cgmath::Rad(yaw))
                .rotate_vector(forward);
        }
        let right = horizontal_right(forward);
        // The rotation must never carry the look vector over a pole, so only
        // the part of the delta that stays inside the limit is applied.
        let current = forward.y.clamp(-1.0, 1.0).asin();
        let pitch = (current + pitch).clamp(-MAX_PITCH, MAX_PITCH) - current;
        if pitch != 0.0 {
            forward =
                cgmath::Quaternion::from_axis_angle(right, cgmath::Rad(pitch)).rotate_vector(forward);
        }
        forward = clamp_pitch(forward.normalize(), right);

        let mut position = self.position;
        let step = {
            let axis = |pos: bool, neg: bool| (pos as i32 - neg as i32) as f32;
            let right = horizontal_right(forward);
            forward * axis(input.forward, input.backward) + right * axis(input.right, input.left)
        };
        if step.magnitude2() > 0.0 {
            position += step.normalize() * self.move_speed * dt;
        }

        self.position = position;
        self.target = position + forward * distance;
        self.update_view();
        true
    }

    fn update_view(&mut self) {
        self.view = cgmath::Matrix4::look_at_rh(self.position, self.target, self.up);
    }

    fn update_projection(&mut self) {
        self.projection = OPENGL_TO_WGPU_MATRIX
            * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar);
    }
}

fn horizontal_right(forward: cgmath::Vector3<f32>) -> cgmath::Vector3<f32> {
    let right = forward.cross(WORLD_UP);
    if right.magnitude2() > 1e-8 {
        right.normalize()
    } else {
        cgmath::Vector3::unit_x()
    }
}

/// Limits the vertical component of a unit look vector and rescales the
/// horizontal part so the result stays unit length.
fn clamp_pitch(forward: cgmath::Vector3<f32>, right: cgmath::Vector3<f32>) -> cgmath::Vector3<f32> {
    let max_y = MAX_PITCH.sin();
    if forward.y.abs() <= max_y {
        return forward;
    }
    let y = max_y.copysign(forward.y);
    let mut horizontal = cgmath::Vector2::new(forward.x, forward.z);
    if horizontal.magnitude2() < 1e-12 {
        // Looking straight through a pole: fall back to the direction facing
        // away from the right axis.
        let fallback = WORLD_UP.cross(right);
        horizontal = cgmath::Vector2::new(fallback.x, fallback.z);
    }
    let horizontal = horizontal.normalize() * (1.0 - y * y).sqrt();
    cgmath::Vector3::new(horizontal.x, y, horizontal.y)
}
