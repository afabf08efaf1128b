//! Quaternion helpers shared across the blend and IK code.

use glam::{Mat3, Quat, Vec3};

const PARALLEL_EPSILON: f32 = 1.0e-4;

/// Shortest-arc lerp: flips the sign of `b` when the dot product is
/// negative, lerps, renormalises. Cheaper than slerp and sufficient for
/// the small per-frame deltas the graph produces.
pub fn safe_lerp(a: Quat, b: Quat, alpha: f32) -> Quat {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    a.lerp(b, alpha).normalize()
}

/// Normalized sign-corrected quaternion sum; a weighted mean on the
/// 4-sphere assuming small angular spread.
pub fn average_quats(quats: &[Quat]) -> Quat {
    let Some(&first) = quats.first() else {
        return Quat::IDENTITY;
    };
    let mut accum = first;
    for &q in &quats[1..] {
        let q = if first.dot(q) < 0.0 { -q } else { q };
        accum = accum + q;
    }
    accum.normalize()
}

/// Factor `rotation` into a swing and a twist about `twist_axis`, such
/// that `rotation = swing * twist`. `twist_axis` must be unit length.
pub fn swing_twist_decomposition(rotation: Quat, twist_axis: Vec3) -> (Quat, Quat) {
    let axis_part = Vec3::new(rotation.x, rotation.y, rotation.z);
    let projected = twist_axis * axis_part.dot(twist_axis);
    let twist = Quat::from_xyzw(projected.x, projected.y, projected.z, rotation.w);
    let len = twist.length();
    // rotation is a half-turn about an axis perpendicular to twist_axis
    if len < PARALLEL_EPSILON {
        return (rotation, Quat::IDENTITY);
    }
    let twist = twist / len;
    let swing = rotation * twist.inverse();
    (swing, twist)
}

/// Build an orthonormal right-handed basis from a primary direction and a
/// secondary hint. Returns `(u, v, w)` where `u` is the normalized primary,
/// `v` the secondary orthogonalized against it, and `w = u × v`.
pub fn generate_basis_vectors(primary: Vec3, secondary: Vec3) -> (Vec3, Vec3, Vec3) {
    let u = primary.normalize();
    let mut norm_secondary = secondary.normalize();
    if (u.dot(norm_secondary).abs() - 1.0).abs() < PARALLEL_EPSILON {
        // secondary is parallel to primary, pick a cardinal axis instead
        norm_secondary = if u.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    }
    let w = u.cross(norm_secondary).normalize();
    let v = w.cross(u);
    (u, v, w)
}

/// Rotation whose y-axis points along `y` and whose x-axis stays as close
/// as possible to `x_hint`.
pub fn quat_from_y_x(y: Vec3, x_hint: Vec3) -> Quat {
    let (y_axis, x_axis, _) = generate_basis_vectors(y, x_hint);
    let z_axis = x_axis.cross(y_axis);
    Quat::from_mat3(&Mat3::from_cols(x_axis, y_axis, z_axis)).normalize()
}
