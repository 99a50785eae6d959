//! Viewer configuration.
//!
//! Everything the viewer does is driven by a single [`ViewerConfig`]. Its
//! [`Default`] reproduces the stock scene: a black background, a grey 500x500
//! platform, ambient + directional light, the bee model scaled by 50 and lifted
//! 50 units above the platform, and the camera 100 units away on the Z axis.

use anyhow::{bail, ensure};
use cgmath::{Deg, Point3, Vector3};

/// A colour in `0xRRGGBB` notation, interpreted as sRGB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hex(pub u32);

impl Hex {
    /// The colour as sRGB components in `0.0..=1.0`.
    pub fn to_srgb(self) -> [f32; 3] {
        [
            ((self.0 >> 16) & 0xff) as f32 / 255.0,
            ((self.0 >> 8) & 0xff) as f32 / 255.0,
            (self.0 & 0xff) as f32 / 255.0,
        ]
    }

    /// The colour converted into linear space, which is what the shaders light with.
    pub fn to_linear_rgb(self) -> [f32; 3] {
        self.to_srgb().map(srgb_to_linear)
    }
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    /// Vertical field of view.
    pub fovy: Deg<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 1.0, 100.0),
            target: Point3::new(0.0, 0.0, 0.0),
            fovy: Deg(75.0),
            znear: 0.1,
            zfar: 1000.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ControlsConfig {
    pub enable_damping: bool,
    pub damping_factor: f32,
    /// Pan in the camera plane instead of the plane orthogonal to the up axis.
    pub screen_space_panning: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: 0.25,
            screen_space_panning: false,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: std::f32::consts::PI,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LightConfig {
    pub ambient_colour: Hex,
    pub ambient_intensity: f32,
    pub directional_colour: Hex,
    pub directional_intensity: f32,
    /// Position of the directional light. Only its direction towards the origin matters.
    pub directional_position: Vector3<f32>,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            ambient_colour: Hex(0x404040),
            ambient_intensity: 1.0,
            directional_colour: Hex(0xffffff),
            directional_intensity: 1.0,
            directional_position: Vector3::new(5.0, 5.0, 5.0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub width: f32,
    pub height: f32,
    pub colour: Hex,
    pub roughness: f32,
    pub metalness: f32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            width: 500.0,
            height: 500.0,
            colour: Hex(0x808080),
            roughness: 1.0,
            metalness: 0.0,
        }
    }
}

/// Replaces every material of the loaded model. Only the colour map and the
/// normal map of the original material survive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialOverride {
    pub roughness: f32,
    pub metalness: f32,
}

impl Default for MaterialOverride {
    fn default() -> Self {
        Self {
            roughness: 0.5,
            metalness: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// Path relative to the `assets/` directory (native) or `<origin>/assets/` (web).
    pub path: String,
    pub scale: Vector3<f32>,
    pub position: Vector3<f32>,
    pub material: MaterialOverride,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "animated_bee.glb".to_string(),
            scale: Vector3::new(50.0, 50.0, 50.0),
            position: Vector3::new(0.0, 50.0, 0.0),
            material: MaterialOverride::default(),
        }
    }
}

/// How far the animation mixer advances each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MixerClock {
    /// A constant step in seconds per rendered frame, independent of the frame rate.
    Fixed(f32),
    /// The measured time between frames.
    RealTime,
}

#[derive(Clone, Debug)]
pub struct AnimationConfig {
    pub clock: MixerClock,
    pub loop_mode: crate::animation::LoopMode,
    /// `None` loops forever.
    pub repetitions: Option<u32>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            clock: MixerClock::Fixed(0.01),
            loop_mode: crate::animation::LoopMode::Repeat,
            repetitions: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub title: String,
    pub clear_colour: wgpu::Color,
    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub lights: LightConfig,
    pub platform: PlatformConfig,
    pub model: ModelConfig,
    pub animation: AnimationConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "orbit-viewer".to_string(),
            clear_colour: wgpu::Color::BLACK,
            camera: CameraConfig::default(),
            controls: ControlsConfig::default(),
            lights: LightConfig::default(),
            platform: PlatformConfig::default(),
            model: ModelConfig::default(),
            animation: AnimationConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Rejects settings that would produce a degenerate projection or scene.
    pub fn validate(&self) -> anyhow::Result<()> {
        let cam = &self.camera;
        ensure!(
            cam.fovy.0 > 0.0 && cam.fovy.0 < 180.0,
            "camera fov must be within (0, 180) degrees, got {}",
            cam.fovy.0
        );
        ensure!(
            cam.znear > 0.0 && cam.zfar > cam.znear,
            "camera clip planes must satisfy 0 < near < far, got near={} far={}",
            cam.znear,
            cam.zfar
        );
        ensure!(
            cam.position != cam.target,
            "camera position and target must differ"
        );

        let controls = &self.controls;
        if controls.enable_damping
            && !(controls.damping_factor > 0.0 && controls.damping_factor <= 1.0)
        {
            bail!(
                "damping factor must be within (0, 1], got {}",
                controls.damping_factor
            );
        }
        ensure!(
            controls.min_distance >= 0.0 && controls.max_distance >= controls.min_distance,
            "orbit distance range is empty"
        );
        ensure!(
            controls.min_polar_angle <= controls.max_polar_angle,
            "orbit polar angle range is empty"
        );

        ensure!(
            self.platform.width > 0.0 && self.platform.height > 0.0,
            "platform must have a positive size"
        );

        let s = self.model.scale;
        ensure!(
            s.x != 0.0 && s.y != 0.0 && s.z != 0.0,
            "model scale must be non-zero on every axis"
        );
        ensure!(!self.model.path.is_empty(), "model path is empty");

        if let MixerClock::Fixed(step) = self.animation.clock {
            ensure!(
                step.is_finite() && step >= 0.0,
                "fixed mixer step must be a non-negative number of seconds"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_stock_scene() {
        let config = ViewerConfig::default();
        assert_eq!(config.camera.position, Point3::new(0.0, 1.0, 100.0));
        assert_eq!(config.camera.fovy, Deg(75.0));
        assert_eq!(config.controls.damping_factor, 0.25);
        assert!(!config.controls.screen_space_panning);
        assert_eq!(config.model.scale, Vector3::new(50.0, 50.0, 50.0));
        assert_eq!(config.model.position, Vector3::new(0.0, 50.0, 0.0));
        assert_eq!(config.animation.clock, MixerClock::Fixed(0.01));
        assert_eq!(config.animation.repetitions, None);
        assert_eq!(config.clear_colour, wgpu::Color::BLACK);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_degenerate_settings() {
        let mut config = ViewerConfig::default();
        config.camera.znear = 0.0;
        assert!(config.validate().is_err());

        let mut config = ViewerConfig::default();
        config.controls.damping_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = ViewerConfig::default();
        config.controls.enable_damping = false;
        config.controls.damping_factor = 1.5;
        assert!(config.validate().is_ok());

        let mut config = ViewerConfig::default();
        config.model.scale = Vector3::new(1.0, 0.0, 1.0);
        assert!(config.validate().is_err());

        let mut config = ViewerConfig::default();
        config.animation.clock = MixerClock::Fixed(f32::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn hex_colours_convert_to_linear() {
        assert_eq!(Hex(0x000000).to_linear_rgb(), [0.0; 3]);
        assert_eq!(Hex(0xffffff).to_linear_rgb(), [1.0; 3]);
        let [r, g, b] = Hex(0x808080).to_linear_rgb();
        assert!((r - 0.2158605).abs() < 1e-4);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(Hex(0xff0000).to_srgb(), [1.0, 0.0, 0.0]);
    }
}
