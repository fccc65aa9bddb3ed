//! Per-draw context supplied by the scene. Update routines read it; the
//! compiler never sees where it comes from.

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightType {
    #[default]
    Directional,
    Point,
    Spot,
}

impl LightType {
    /// Encoding used in the `w` component of light position uniforms.
    pub fn encoded(self) -> f32 {
        match self {
            LightType::Directional => 0.0,
            LightType::Point => 1.0,
            LightType::Spot => 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub ty: LightType,
    pub position: Vec3,
    pub direction: Vec3,
    /// Linear color, intensity in `w`.
    pub color: Vec4,
    /// Cone angle in degrees; only used by spot lights.
    pub spot_angle: f32,
    /// World to light clip space, used for shadow lookups.
    pub light_mvp: Mat4,
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec4) -> Self {
        Self {
            ty: LightType::Directional,
            position: Vec3::ZERO,
            direction: direction.normalize_or_zero(),
            color,
            spot_angle: 0.0,
            light_mvp: Mat4::IDENTITY,
        }
    }

    pub fn point(position: Vec3, color: Vec4) -> Self {
        Self {
            ty: LightType::Point,
            position,
            direction: Vec3::NEG_Y,
            color,
            spot_angle: 0.0,
            light_mvp: Mat4::IDENTITY,
        }
    }

    pub fn spot(position: Vec3, direction: Vec3, spot_angle: f32, color: Vec4) -> Self {
        Self {
            ty: LightType::Spot,
            position,
            direction: direction.normalize_or_zero(),
            color,
            spot_angle,
            light_mvp: Mat4::IDENTITY,
        }
    }

    pub fn with_light_mvp(mut self, light_mvp: Mat4) -> Self {
        self.light_mvp = light_mvp;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CameraData {
    pub view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub position: Vec3,
}

impl CameraData {
    pub fn new(view: Mat4, proj: Mat4) -> Self {
        let position = view.inverse().w_axis.truncate();
        Self {
            view,
            proj,
            inv_proj: proj.inverse(),
            position,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }
}

impl Default for CameraData {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// Everything update routines may read for one draw command.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawContext {
    pub camera: CameraData,
    pub model: Mat4,
    pub viewport: [u32; 2],
    pub lights: Vec<Light>,
}

impl Default for DrawContext {
    fn default() -> Self {
        Self {
            camera: CameraData::default(),
            model: Mat4::IDENTITY,
            viewport: [1, 1],
            lights: Vec::new(),
        }
    }
}

impl DrawContext {
    /// Synthetic context used at compile time to run every update routine
    /// once: a real camera and one light of each type.
    pub fn dry_run() -> Self {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        Self {
            camera: CameraData::new(view, proj),
            model: Mat4::IDENTITY,
            viewport: [1280, 720],
            lights: vec![
                Light::directional(Vec3::new(-1.0, -1.0, -1.0), Vec4::new(1.0, 1.0, 1.0, 3.0)),
                Light::point(Vec3::new(2.0, 3.0, 1.0), Vec4::new(1.0, 0.8, 0.6, 10.0)),
                Light::spot(Vec3::new(0.0, 4.0, 0.0), Vec3::NEG_Y, 30.0, Vec4::ONE),
            ],
        }
    }

    pub fn with_lights(mut self, lights: Vec<Light>) -> Self {
        self.lights = lights;
        self
    }

    pub fn mvp(&self) -> Mat4 {
        self.camera.view_proj() * self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_position_comes_from_view_inverse() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let camera = CameraData::new(Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y), Mat4::IDENTITY);
        assert!(camera.position.abs_diff_eq(eye, 1e-5));
    }

    #[test]
    fn dry_run_covers_every_light_type() {
        let draw = DrawContext::dry_run();
        let types: Vec<LightType> = draw.lights.iter().map(|l| l.ty).collect();
        assert_eq!(types, vec![LightType::Directional, LightType::Point, LightType::Spot]);
    }
}
