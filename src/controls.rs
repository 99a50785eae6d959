//! Damped orbit controls.
//!
//! The camera circles `camera.target` on a sphere. Left drag changes the
//! azimuth and polar angle, right drag moves the target, the wheel changes the
//! sphere's radius. Input only accumulates deltas; [`OrbitControls::update`]
//! applies a `damping_factor` share of them once per frame and decays the
//! rest, so the camera keeps gliding for a few frames after the input stops.

use std::f32::consts::PI;

use cgmath::{InnerSpace, Point3, Vector2, Vector3, Zero};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::{
    camera::{Camera, Projection},
    config::ControlsConfig,
};

const EPS: f32 = 1e-6;

/// Wheel pixels that count as one line step on touchpads.
const PIXELS_PER_LINE: f64 = 50.0;

/// Radius, azimuth (`theta`, around +Y, zero on +Z) and polar angle (`phi`, from +Y).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spherical {
    pub radius: f32,
    pub theta: f32,
    pub phi: f32,
}

impl Spherical {
    pub fn from_offset(offset: Vector3<f32>) -> Self {
        let radius = offset.magnitude();
        if radius == 0.0 {
            return Self {
                radius,
                theta: 0.0,
                phi: 0.0,
            };
        }
        Self {
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    pub fn to_offset(self) -> Vector3<f32> {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vector3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Drag {
    None,
    Rotate,
    Pan,
}

#[derive(Debug, Clone)]
pub struct OrbitControls {
    config: ControlsConfig,
    theta_delta: f32,
    phi_delta: f32,
    pan_offset: Vector3<f32>,
    pending_pan: Vector2<f32>,
    scale: f32,
    viewport_height: f32,
    cursor: Option<Vector2<f32>>,
    drag: Drag,
}

impl OrbitControls {
    pub fn new(config: ControlsConfig) -> Self {
        Self {
            config,
            theta_delta: 0.0,
            phi_delta: 0.0,
            pan_offset: Vector3::zero(),
            pending_pan: Vector2::zero(),
            scale: 1.0,
            viewport_height: 1.0,
            cursor: None,
            drag: Drag::None,
        }
    }

    pub fn config(&self) -> &ControlsConfig {
        &self.config
    }

    /// Drag distances are measured relative to the viewport height.
    pub fn set_viewport(&mut self, _width: u32, height: u32) {
        if height > 0 {
            self.viewport_height = height as f32;
        }
    }

    /// Routes pointer events. Returns whether the event was consumed.
    pub fn process_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                let drag = match button {
                    MouseButton::Left => Drag::Rotate,
                    MouseButton::Right => Drag::Pan,
                    _ => return false,
                };
                match state {
                    ElementState::Pressed => self.drag = drag,
                    ElementState::Released if self.drag == drag => self.drag = Drag::None,
                    ElementState::Released => {}
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                let current = Vector2::new(position.x as f32, position.y as f32);
                let previous = self.cursor.replace(current);
                match (self.drag, previous) {
                    (Drag::Rotate, Some(previous)) => {
                        let delta = current - previous;
                        self.rotate_by_pixels(delta.x, delta.y);
                        true
                    }
                    (Drag::Pan, Some(previous)) => {
                        let delta = current - previous;
                        self.pan_by_pixels(delta.x, delta.y);
                        true
                    }
                    _ => false,
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.drag = Drag::None;
                false
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y as f64,
                    MouseScrollDelta::PixelDelta(pos) => pos.y / PIXELS_PER_LINE,
                };
                self.dolly(steps as f32);
                steps != 0.0
            }
            _ => false,
        }
    }

    /// Queues an orbit for a pointer drag of `dx`, `dy` pixels.
    pub fn rotate_by_pixels(&mut self, dx: f32, dy: f32) {
        let k = 2.0 * PI * self.config.rotate_speed / self.viewport_height;
        self.rotate_left(k * dx);
        self.rotate_up(k * dy);
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    /// Queues a pan for a pointer drag of `dx`, `dy` pixels. It is converted to
    /// world units on the next update, when the camera distance is known.
    pub fn pan_by_pixels(&mut self, dx: f32, dy: f32) {
        self.pending_pan += Vector2::new(dx, dy) * self.config.pan_speed;
    }

    /// Positive steps (wheel up) move the camera towards the target.
    pub fn dolly(&mut self, steps: f32) {
        if steps == 0.0 {
            return;
        }
        let zoom_scale = 0.95f32.powf(self.config.zoom_speed);
        self.scale *= zoom_scale.powf(steps);
    }

    fn resolve_pending_pan(&mut self, camera: &Camera, projection: &Projection) {
        if self.pending_pan.is_zero() {
            return;
        }
        let pixels = std::mem::replace(&mut self.pending_pan, Vector2::zero());

        let offset = camera.position - camera.target;
        // half of the visible height at the target's depth
        let target_distance = offset.magnitude() * (projection.fovy.0 / 2.0).tan();
        let per_pixel = 2.0 * target_distance / self.viewport_height;

        let forward = -offset.normalize();
        let right = forward.cross(camera.up).normalize();
        self.pan_offset += right * (-pixels.x * per_pixel);

        let up = if self.config.screen_space_panning {
            right.cross(forward)
        } else {
            camera.up.cross(right)
        };
        self.pan_offset += up * (pixels.y * per_pixel);
    }

    /// Moves the camera by the damped share of the queued input.
    /// Returns whether the camera changed.
    pub fn update(&mut self, camera: &mut Camera, projection: &Projection) -> bool {
        self.resolve_pending_pan(camera, projection);

        let before = (camera.position, camera.target);
        let mut spherical = Spherical::from_offset(camera.position - camera.target);

        let share = if self.config.enable_damping {
            self.config.damping_factor
        } else {
            1.0
        };
        spherical.theta += self.theta_delta * share;
        spherical.phi += self.phi_delta * share;
        spherical.phi = spherical
            .phi
            .clamp(self.config.min_polar_angle, self.config.max_polar_angle)
            .clamp(EPS, PI - EPS);
        spherical.radius = (spherical.radius * self.scale)
            .clamp(self.config.min_distance, self.config.max_distance);

        camera.target += self.pan_offset * share;
        camera.position = camera.target + spherical.to_offset();

        if self.config.enable_damping {
            let decay = 1.0 - self.config.damping_factor;
            self.theta_delta *= decay;
            self.phi_delta *= decay;
            self.pan_offset *= decay;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vector3::zero();
        }
        self.scale = 1.0;

        moved(before.0, camera.position) || moved(before.1, camera.target)
    }
}

fn moved(a: Point3<f32>, b: Point3<f32>) -> bool {
    (b - a).magnitude2() > EPS
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, MetricSpace};

    use super::*;
    use crate::config::CameraConfig;

    fn setup() -> (OrbitControls, Camera, Projection) {
        let mut controls = OrbitControls::new(ControlsConfig::default());
        controls.set_viewport(800, 600);
        let camera_config = CameraConfig::default();
        (
            controls,
            Camera::from(&camera_config),
            Projection::from_config(800, 600, &camera_config),
        )
    }

    #[test]
    fn spherical_round_trips_offsets() {
        let offset = Vector3::new(3.0, -4.0, 12.0);
        let s = Spherical::from_offset(offset);
        assert!((s.radius - 13.0).abs() < 1e-5);
        assert!((s.to_offset() - offset).magnitude() < 1e-4);
    }

    #[test]
    fn update_without_input_keeps_the_camera_still() {
        let (mut controls, mut camera, projection) = setup();
        let start = camera.position;
        assert!(!controls.update(&mut camera, &projection));
        assert!(camera.position.distance(start) < 1e-3);
    }

    #[test]
    fn damping_applies_a_share_and_decays_the_rest() {
        let (mut controls, mut camera, projection) = setup();
        let theta0 = Spherical::from_offset(camera.position - camera.target).theta;

        controls.rotate_left(0.4);
        assert!(controls.update(&mut camera, &projection));
        let theta1 = Spherical::from_offset(camera.position - camera.target).theta;
        assert!((theta1 - (theta0 - 0.4 * 0.25)).abs() < 1e-4);

        // no new input, camera keeps gliding by 0.25 of the remaining 0.3
        assert!(controls.update(&mut camera, &projection));
        let theta2 = Spherical::from_offset(camera.position - camera.target).theta;
        assert!((theta2 - (theta1 - 0.3 * 0.25)).abs() < 1e-4);

        for _ in 0..200 {
            controls.update(&mut camera, &projection);
        }
        assert!(!controls.update(&mut camera, &projection));
    }

    #[test]
    fn without_damping_input_is_applied_at_once() {
        let (_, mut camera, projection) = setup();
        let mut controls = OrbitControls::new(ControlsConfig {
            enable_damping: false,
            ..Default::default()
        });
        controls.set_viewport(800, 600);
        let theta0 = Spherical::from_offset(camera.position - camera.target).theta;
        controls.rotate_left(0.4);
        controls.update(&mut camera, &projection);
        let theta1 = Spherical::from_offset(camera.position - camera.target).theta;
        assert!((theta1 - (theta0 - 0.4)).abs() < 1e-4);
        assert!(!controls.update(&mut camera, &projection));
    }

    #[test]
    fn polar_angle_never_flips_over_the_pole() {
        let (mut controls, mut camera, projection) = setup();
        controls.rotate_up(10.0);
        for _ in 0..50 {
            controls.update(&mut camera, &projection);
        }
        let s = Spherical::from_offset(camera.position - camera.target);
        assert!(s.phi < 0.01);
        assert!(camera.position.y > 0.0);
        assert!(camera.position.x.is_finite() && camera.position.z.is_finite());
    }

    #[test]
    fn wheel_up_moves_towards_the_target() {
        let (mut controls, mut camera, projection) = setup();
        let r0 = camera.position.distance(camera.target);
        controls.dolly(1.0);
        controls.update(&mut camera, &projection);
        let r1 = camera.position.distance(camera.target);
        assert!((r1 - r0 * 0.95).abs() < 1e-3);

        controls.dolly(-2.0);
        controls.update(&mut camera, &projection);
        let r2 = camera.position.distance(camera.target);
        assert!(r2 > r0);
    }

    #[test]
    fn distance_is_clamped() {
        let (_, mut camera, projection) = setup();
        let mut controls = OrbitControls::new(ControlsConfig {
            min_distance: 50.0,
            max_distance: 150.0,
            ..Default::default()
        });
        controls.dolly(100.0);
        controls.update(&mut camera, &projection);
        assert!((camera.position.distance(camera.target) - 50.0).abs() < 1e-3);
        controls.dolly(-100.0);
        controls.update(&mut camera, &projection);
        assert!((camera.position.distance(camera.target) - 150.0).abs() < 1e-3);
    }

    #[test]
    fn vertical_drag_pans_on_the_ground_plane() {
        let (mut controls, mut camera, projection) = setup();
        controls.pan_by_pixels(0.0, 100.0);
        controls.update(&mut camera, &projection);
        assert!(camera.target.y.abs() < 1e-4);
        assert!(camera.target.z < 0.0);
        assert!(camera.target.x.abs() < 1e-4);
    }

    #[test]
    fn screen_space_panning_moves_along_the_camera_up() {
        let (_, mut camera, projection) = setup();
        let mut controls = OrbitControls::new(ControlsConfig {
            screen_space_panning: true,
            enable_damping: false,
            ..Default::default()
        });
        controls.set_viewport(800, 600);
        controls.pan_by_pixels(0.0, 100.0);
        controls.update(&mut camera, &projection);
        assert!(camera.target.y > 0.0);

        // a full viewport height of drag covers the visible height at the target
        let (_, mut camera, _) = setup();
        let distance = camera.position.distance(camera.target);
        controls.pan_by_pixels(-600.0, 0.0);
        controls.update(&mut camera, &projection);
        let expected = 2.0 * distance * (Deg(37.5f32).0.to_radians()).tan();
        assert!((camera.target.x - expected).abs() < 1e-2);
    }
}
