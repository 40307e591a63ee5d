use core::ops::{Deref, DerefMut};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::{
    GBufferEntry, LightId, LightsView, Occluder, Ray, Reservoir, WhiteNoise,
};

/// Reservoir of direct-illumination light samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiReservoir {
    pub reservoir: Reservoir<DiSample>,
}

/// Memory layout of [`DiReservoir`]; zeroed memory is an empty reservoir.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DiReservoirData {
    pub light_point: Vec3,
    pub light_id: u32,
    pub m: f32,
    pub w: f32,
    pub w_sum: f32,
    pub pdf: f32,
}

impl DiReservoir {
    pub fn read(buffer: &[DiReservoirData], id: usize) -> Self {
        Self::unpack(buffer[id])
    }

    pub fn write(self, buffer: &mut [DiReservoirData], id: usize) {
        buffer[id] = self.pack();
    }

    pub fn unpack(data: DiReservoirData) -> Self {
        Self {
            reservoir: Reservoir {
                sample: DiSample {
                    pdf: data.pdf,
                    light_id: LightId::new(data.light_id),
                    light_point: data.light_point,
                },
                m: data.m,
                w_sum: data.w_sum,
                w: data.w,
            },
        }
    }

    pub fn pack(self) -> DiReservoirData {
        DiReservoirData {
            light_point: self.sample.light_point,
            light_id: self.sample.light_id.get(),
            m: self.m,
            w: self.w,
            w_sum: self.w_sum,
            pdf: self.sample.pdf,
        }
    }

    /// Returns whether this reservoir holds no valid selection, in which case
    /// it mustn't be shaded.
    pub fn is_empty(&self) -> bool {
        !(self.w > 0.0)
    }

    /// Merges a reservoir coming from another pixel (or another frame) into
    /// this one.
    ///
    /// `pdf` is the target function of `rhs`'s sample re-evaluated at this
    /// reservoir's surface; it becomes the sample's new `pdf`, if selected.
    pub fn merge_from(
        &mut self,
        wnoise: &mut WhiteNoise,
        rhs: &Self,
        pdf: f32,
        jacobian: f32,
    ) -> bool {
        let mut rhs = *rhs;

        rhs.sample.pdf = pdf;

        self.reservoir.merge(wnoise, &rhs.reservoir, pdf * jacobian)
    }

    /// Turns the accumulated weight into the contribution weight, using the
    /// selected sample's own target function.
    pub fn finalize(&mut self) {
        let pdf = self.sample.pdf;

        self.normalize(pdf);

        if self.w == 0.0 {
            self.sample = Default::default();
        }
    }
}

impl Deref for DiReservoir {
    type Target = Reservoir<DiSample>;

    fn deref(&self) -> &Self::Target {
        &self.reservoir
    }
}

impl DerefMut for DiReservoir {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reservoir
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiSample {
    /// Target function of this sample at the surface owning the reservoir.
    pub pdf: f32,
    pub light_id: LightId,
    pub light_point: Vec3,
}

impl DiSample {
    /// Evaluates the target function of this sample at given surface; stale
    /// samples (pointing at lights that don't exist) evaluate to zero.
    pub fn pdf(self, lights: LightsView, surface: &GBufferEntry) -> f32 {
        lights
            .get(self.light_id)
            .map(|light| {
                light.target_pdf(
                    self.light_point,
                    surface.position,
                    surface.normal,
                )
            })
            .unwrap_or_default()
    }

    /// Returns the shadow ray connecting given surface with this sample.
    pub fn ray(self, surface: &GBufferEntry) -> Ray {
        Ray::shadow(surface.position, surface.normal, self.light_point)
    }

    pub fn is_visible_from<O>(
        self,
        occluder: &O,
        surface: &GBufferEntry,
    ) -> bool
    where
        O: Occluder + ?Sized,
    {
        !occluder.is_occluded(self.ray(surface))
    }

    /// Returns the Jacobian determinant of reusing this sample, drawn for a
    /// surface at `src`, at a surface at `dst`.
    ///
    /// Since contribution weights are expressed per unit solid angle, moving
    /// a sample to another surface changes the solid angle the light's
    /// differential area subtends:
    ///
    /// ```text
    /// J = (cos(phi_dst) * |y - src|^2) / (cos(phi_src) * |y - dst|^2)
    /// ```
    ///
    /// ... where `y` is the point on the light and `phi` is the angle at the
    /// light (for point lights, `cos(phi)` is one).
    pub fn jacobian(self, lights: LightsView, dst: Vec3, src: Vec3) -> f32 {
        let Some(light) = lights.get(self.light_id) else {
            return 0.0;
        };

        let dst_dist = self.light_point.distance_squared(dst);
        let src_dist = self.light_point.distance_squared(src);
        let dst_cos = light.cos_at(self.light_point, dst);
        let src_cos = light.cos_at(self.light_point, src);

        if dst_dist <= 0.0 || src_cos <= 0.0 {
            return 0.0;
        }

        let jacobian = (dst_cos * src_dist) / (src_cos * dst_dist);

        if jacobian.is_finite() {
            jacobian
        } else {
            0.0
        }
    }
}
