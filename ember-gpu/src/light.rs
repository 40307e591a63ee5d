use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::{F32Ext, Vec3Ext, WhiteNoise};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Light {
    /// x - position x (point light) or first vertex x (triangle light)
    /// y - position y (point light) or first vertex y (triangle light)
    /// z - position z (point light) or first vertex z (triangle light)
    /// w - (as u32) light type: 0 - point light, 1 - triangle light
    pub d0: Vec4,

    /// xyz - second vertex (triangle light)
    pub d1: Vec4,

    /// xyz - third vertex (triangle light)
    pub d2: Vec4,

    /// x - color r
    /// y - color g
    /// z - color b
    /// w - luminance
    pub d3: Vec4,

    /// xyz - normal (triangle light)
    /// w - area (triangle light)
    pub d4: Vec4,
}

impl Light {
    pub const TYPE_POINT: u32 = 0;
    pub const TYPE_TRIANGLE: u32 = 1;

    pub fn point(position: Vec3, color: Vec3) -> Self {
        Self {
            d0: position.extend(f32::from_bits(Self::TYPE_POINT)),
            d1: Vec4::ZERO,
            d2: Vec4::ZERO,
            d3: color.extend(color.luminance()),
            d4: Vec4::ZERO,
        }
    }

    /// Creates an emissive triangle; the normal follows the
    /// `(p2 - p1) x (p3 - p1)` winding.
    pub fn triangle([p1, p2, p3]: [Vec3; 3], emission: Vec3) -> Self {
        let cross = (p2 - p1).cross(p3 - p1);
        let length = cross.length();

        let normal = if length > 0.0 {
            cross / length
        } else {
            Vec3::ZERO
        };

        Self {
            d0: p1.extend(f32::from_bits(Self::TYPE_TRIANGLE)),
            d1: p2.extend(0.0),
            d2: p3.extend(0.0),
            d3: emission.extend(emission.luminance()),
            d4: normal.extend(0.5 * length),
        }
    }

    pub fn ty(&self) -> u32 {
        self.d0.w.to_bits()
    }

    pub fn is_point(&self) -> bool {
        self.ty() == Self::TYPE_POINT
    }

    pub fn is_triangle(&self) -> bool {
        self.ty() == Self::TYPE_TRIANGLE
    }

    pub fn position(&self) -> Vec3 {
        self.d0.xyz()
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.d0.xyz(), self.d1.xyz(), self.d2.xyz()]
    }

    pub fn color(&self) -> Vec3 {
        self.d3.xyz()
    }

    pub fn luminance(&self) -> f32 {
        self.d3.w
    }

    pub fn normal(&self) -> Vec3 {
        self.d4.xyz()
    }

    pub fn area(&self) -> f32 {
        self.d4.w
    }

    /// Returns the importance of this light used to build the alias table:
    /// luminance for point lights, luminance times area for triangle lights.
    pub fn weight(&self) -> f32 {
        if self.is_triangle() {
            self.luminance() * self.area()
        } else {
            self.luminance()
        }
    }

    /// Picks a point on this light, returning it together with its density
    /// with respect to the light's area.
    pub fn sample(&self, wnoise: &mut WhiteNoise) -> LightSample {
        if self.is_triangle() {
            let [p1, p2, p3] = self.vertices();
            let bary = wnoise.sample_barycentric();

            LightSample {
                point: p1 + bary.x * (p2 - p1) + bary.y * (p3 - p1),
                area_pdf: 1.0 / self.area(),
            }
        } else {
            LightSample {
                point: self.position(),
                area_pdf: 1.0,
            }
        }
    }

    /// Returns the cosine between this light's normal and the direction
    /// towards `point`; point lights emit uniformly, so for them it's always
    /// one.
    ///
    /// Triangle lights emit from both sides.
    pub fn cos_at(&self, light_point: Vec3, point: Vec3) -> f32 {
        if self.is_triangle() {
            let dir = point - light_point;
            let len = dir.length();

            if len > 0.0 {
                self.normal().dot(dir / len).abs()
            } else {
                0.0
            }
        } else {
            1.0
        }
    }

    /// Returns the target function used for resampling: luminance of this
    /// light's unshadowed contribution at given surface point, expressed per
    /// unit solid angle.
    pub fn target_pdf(
        &self,
        light_point: Vec3,
        surface_point: Vec3,
        surface_normal: Vec3,
    ) -> f32 {
        let l = light_point - surface_point;
        let len = l.length();

        if len <= 0.0 || self.cos_at(light_point, surface_point) <= 0.0 {
            return 0.0;
        }

        self.luminance() * surface_normal.dot(l / len).saturate()
    }

    /// Converts an area density of `light_point` into a solid-angle density
    /// as seen from `surface_point`.
    pub fn solid_angle_pdf(
        &self,
        light_point: Vec3,
        surface_point: Vec3,
        area_pdf: f32,
    ) -> f32 {
        let cos = self.cos_at(light_point, surface_point);

        if cos <= 0.0 {
            return 0.0;
        }

        area_pdf * light_point.distance_squared(surface_point) / cos
    }
}

/// Point sampled on a light.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightSample {
    pub point: Vec3,
    pub area_pdf: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LightId(u32);

impl LightId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}
