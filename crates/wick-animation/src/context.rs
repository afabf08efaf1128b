//! Per-frame evaluation context handed down through the tree.

use glam::{Mat4, Quat, Vec3};

/// Wall-clock budget for a single CCD solve.
pub const DEFAULT_CCD_TIME_BUDGET_US: u64 = 10_000;

/// Read-only per-frame state: the rig/geometry frame conversion and the
/// host-provided monotonic clock used for the CCD time budget.
#[derive(Debug, Clone)]
pub struct EvalContext {
    geometry_to_rig: Mat4,
    rig_to_geometry: Mat4,
    rig_to_geometry_rot: Quat,
    now_us: u64,
    ccd_time_budget_us: u64,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, 0)
    }
}

impl EvalContext {
    pub fn new(geometry_to_rig: Mat4, now_us: u64) -> Self {
        let rig_to_geometry = geometry_to_rig.inverse();
        let (_, rig_to_geometry_rot, _) = rig_to_geometry.to_scale_rotation_translation();
        Self {
            geometry_to_rig,
            rig_to_geometry,
            rig_to_geometry_rot: rig_to_geometry_rot.normalize(),
            now_us,
            ccd_time_budget_us: DEFAULT_CCD_TIME_BUDGET_US,
        }
    }

    pub fn with_ccd_time_budget_us(mut self, budget_us: u64) -> Self {
        self.ccd_time_budget_us = budget_us;
        self
    }

    pub fn geometry_to_rig(&self) -> &Mat4 {
        &self.geometry_to_rig
    }

    /// Host-provided monotonic timestamp for this frame, in microseconds.
    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    pub fn ccd_time_budget_us(&self) -> u64 {
        self.ccd_time_budget_us
    }

    /// Convert a rig-frame position into the geometry frame.
    pub fn rig_to_geometry_point(&self, point: Vec3) -> Vec3 {
        self.rig_to_geometry.transform_point3(point)
    }

    /// Convert a rig-frame direction into the geometry frame.
    pub fn rig_to_geometry_vector(&self, vector: Vec3) -> Vec3 {
        self.rig_to_geometry.transform_vector3(vector)
    }

    /// Convert a rig-frame rotation into the geometry frame.
    pub fn rig_to_geometry_rot(&self, rot: Quat) -> Quat {
        (self.rig_to_geometry_rot * rot).normalize()
    }

    /// Look up a rig-frame position variable and convert it; `default` is
    /// already in the geometry frame and is returned untouched when the
    /// key is absent or mis-typed.
    pub fn lookup_rig_point(&self, vars: &crate::variables::VariantMap, key: &str, default: Vec3) -> Vec3 {
        if key.is_empty() || !vars.has_key(key) {
            return default;
        }
        self.rig_to_geometry_point(vars.lookup_vec3(key, self.geometry_to_rig.transform_point3(default)))
    }

    /// Like [`lookup_rig_point`] but without the translation part, for
    /// directions.
    ///
    /// [`lookup_rig_point`]: Self::lookup_rig_point
    pub fn lookup_rig_vector(&self, vars: &crate::variables::VariantMap, key: &str, default: Vec3) -> Vec3 {
        if key.is_empty() || !vars.has_key(key) {
            return default;
        }
        self.rig_to_geometry_vector(vars.lookup_vec3(key, self.geometry_to_rig.transform_vector3(default)))
    }

    /// Look up a rig-frame rotation variable and convert it; `default` is
    /// already in the geometry frame.
    pub fn lookup_rig_rot(&self, vars: &crate::variables::VariantMap, key: &str, default: Quat) -> Quat {
        if key.is_empty() || !vars.has_key(key) {
            return default;
        }
        let fallback = (self.rig_to_geometry_rot.inverse() * default).normalize();
        self.rig_to_geometry_rot(vars.lookup_quat(key, fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn identity_context_passes_values_through() {
        let ctx = EvalContext::new(Mat4::IDENTITY, 42);
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert!((ctx.rig_to_geometry_point(p) - p).length() < 1e-6);
        assert_eq!(ctx.now_us(), 42);
    }

    #[test]
    fn conversion_inverts_the_geometry_to_rig_matrix() {
        let geometry_to_rig =
            Mat4::from_rotation_y(FRAC_PI_2) * Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let ctx = EvalContext::new(geometry_to_rig, 0);

        let geom_point = Vec3::new(0.5, 0.0, -0.25);
        let rig_point = geometry_to_rig.transform_point3(geom_point);
        assert!((ctx.rig_to_geometry_point(rig_point) - geom_point).length() < 1e-5);

        let rig_vector = Vec3::X;
        let round_trip = geometry_to_rig.transform_vector3(ctx.rig_to_geometry_vector(rig_vector));
        assert!((round_trip - rig_vector).length() < 1e-5);
    }

    #[test]
    fn rotation_conversion_matches_vector_conversion() {
        let geometry_to_rig = Mat4::from_rotation_z(0.7);
        let ctx = EvalContext::new(geometry_to_rig, 0);
        let rot = Quat::from_axis_angle(Vec3::Y, 0.4);
        let v = Vec3::new(0.0, 0.0, 1.0);
        let a = ctx.rig_to_geometry_rot(rot) * ctx.rig_to_geometry_vector(v);
        let b = ctx.rig_to_geometry_vector(rot * v);
        assert!((a - b).length() < 1e-5);
    }
}
