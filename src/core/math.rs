//! Transform kernels for rigid 3D geometry.
//!
//! All matrices are row-major flat arrays: rotations are `[f64; 9]`, full
//! rigid transforms are `[f64; 16]` with the translation in slots 3, 7, 11.
//! Quaternions are stored `(w, x, y, z)`.
//!
//! Storage elsewhere in the crate is `f32`; everything in here runs in `f64`
//! and callers promote at the boundary.

/// Identity 4x4 transform.
pub const IDENTITY_POSE: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Comparison epsilon for trace clamps and degenerate axes.
pub const EPS: f64 = 1.192_092_896e-7;

// ---------------------------------------------------------------------------
// Vector helpers
// ---------------------------------------------------------------------------

/// Euclidean norm of a 3-vector.
#[inline]
pub fn norm3(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Dot product of two 3-vectors.
#[inline]
pub fn dot3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Cross product of two 3-vectors.
#[inline]
pub fn cross3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Normalize a 3-vector in place. Zero vectors are left untouched.
#[inline]
pub fn normalize3(v: &mut [f64; 3]) {
    let n = norm3(v);
    if n > 0.0 {
        v[0] /= n;
        v[1] /= n;
        v[2] /= n;
    }
}

/// Angle between two vectors in `[0, pi]`.
///
/// Uses `atan2(|a x b|, a . b)`, which stays accurate near 0 and pi where
/// the acos form loses precision.
#[inline]
pub fn angle3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let c = cross3(a, b);
    norm3(&c).atan2(dot3(a, b))
}

// ---------------------------------------------------------------------------
// Matrix products
// ---------------------------------------------------------------------------

/// 3x3 by 3x3 product.
pub fn mat_mul33(a: &[f64; 9], b: &[f64; 9], r: &mut [f64; 9]) {
    for i in 0..3 {
        for j in 0..3 {
            r[i * 3 + j] =
                a[i * 3] * b[j] + a[i * 3 + 1] * b[3 + j] + a[i * 3 + 2] * b[6 + j];
        }
    }
}

/// 3x3 by 3-vector product.
#[inline]
pub fn mat_mul331(a: &[f64; 9], b: &[f64; 3]) -> [f64; 3] {
    [
        a[0] * b[0] + a[1] * b[1] + a[2] * b[2],
        a[3] * b[0] + a[4] * b[1] + a[5] * b[2],
        a[6] * b[0] + a[7] * b[1] + a[8] * b[2],
    ]
}

/// 4x4 by 4x4 product.
pub fn mat_mul44(a: &[f64; 16], b: &[f64; 16], r: &mut [f64; 16]) {
    for i in 0..4 {
        for j in 0..4 {
            r[i * 4 + j] = a[i * 4] * b[j]
                + a[i * 4 + 1] * b[4 + j]
                + a[i * 4 + 2] * b[8 + j]
                + a[i * 4 + 3] * b[12 + j];
        }
    }
}

/// 4x4 by homogeneous 4-vector product.
#[inline]
pub fn mat_mul441(a: &[f64; 16], b: &[f64; 4]) -> [f64; 4] {
    [
        a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[1] + a[6] * b[2] + a[7] * b[3],
        a[8] * b[0] + a[9] * b[1] + a[10] * b[2] + a[11] * b[3],
        a[12] * b[0] + a[13] * b[1] + a[14] * b[2] + a[15] * b[3],
    ]
}

/// Apply a 4x4 transform to a point, with perspective divide.
#[inline]
pub fn transform_point(pose: &[f64; 16], p: &[f64; 3]) -> [f64; 3] {
    let h = mat_mul441(pose, &[p[0], p[1], p[2], 1.0]);
    if h[3].abs() > EPS {
        [h[0] / h[3], h[1] / h[3], h[2] / h[3]]
    } else {
        [h[0], h[1], h[2]]
    }
}

/// Transpose a 3x3 matrix.
#[inline]
pub fn transpose33(a: &[f64; 9]) -> [f64; 9] {
    [a[0], a[3], a[6], a[1], a[4], a[7], a[2], a[5], a[8]]
}

// ---------------------------------------------------------------------------
// R,t <-> 4x4
// ---------------------------------------------------------------------------

/// Compose a rotation and translation into a 4x4 transform.
pub fn rt_to_pose(r: &[f64; 9], t: &[f64; 3]) -> [f64; 16] {
    [
        r[0], r[1], r[2], t[0], //
        r[3], r[4], r[5], t[1], //
        r[6], r[7], r[8], t[2], //
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Extract the rotation and translation from a 4x4 transform.
pub fn pose_to_rt(pose: &[f64; 16]) -> ([f64; 9], [f64; 3]) {
    (
        [
            pose[0], pose[1], pose[2], //
            pose[4], pose[5], pose[6], //
            pose[8], pose[9], pose[10],
        ],
        [pose[3], pose[7], pose[11]],
    )
}

/// Invert a rigid 4x4 transform: rotation transposed, translation `-R^T t`.
pub fn invert_rigid(pose: &[f64; 16]) -> [f64; 16] {
    let (r, t) = pose_to_rt(pose);
    let rt = transpose33(&r);
    let ti = mat_mul331(&rt, &t);
    rt_to_pose(&rt, &[-ti[0], -ti[1], -ti[2]])
}

// ---------------------------------------------------------------------------
// Axis-angle
// ---------------------------------------------------------------------------

/// Rodrigues rotation from a unit axis and an angle.
pub fn axis_angle_to_rotation(axis: &[f64; 3], angle: f64) -> [f64; 9] {
    let (s, c) = angle.sin_cos();
    let c1 = 1.0 - c;
    let (x, y, z) = (axis[0], axis[1], axis[2]);
    [
        c + x * x * c1,
        -z * s + x * y * c1,
        y * s + x * z * c1,
        z * s + y * x * c1,
        c + y * y * c1,
        -x * s + y * z * c1,
        -y * s + z * x * c1,
        x * s + z * y * c1,
        c + z * z * c1,
    ]
}

/// Recover the axis and angle of a rotation matrix.
///
/// The identity (and any rotation whose skew part vanishes) returns angle 0
/// with the x axis.
pub fn rotation_to_axis_angle(r: &[f64; 9]) -> ([f64; 3], f64) {
    let d = [r[7] - r[5], r[2] - r[6], r[3] - r[1]];
    let n = norm3(&d);
    let trace = r[0] + r[4] + r[8];
    let angle = (((trace - 1.0) * 0.5).clamp(-1.0, 1.0)).acos();
    if n < EPS {
        return ([1.0, 0.0, 0.0], if angle < EPS { 0.0 } else { angle });
    }
    ([d[0] / n, d[1] / n, d[2] / n], angle)
}

/// Rotation of `angle` radians about the +x axis, 3x3 form.
pub fn unit_x_rotation(angle: f64) -> [f64; 9] {
    let (s, c) = angle.sin_cos();
    [1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c]
}

/// Rotation of `angle` radians about the +x axis, 4x4 form.
pub fn unit_x_rotation_44(angle: f64) -> [f64; 16] {
    let (s, c) = angle.sin_cos();
    [
        1.0, 0.0, 0.0, 0.0, //
        0.0, c, -s, 0.0, //
        0.0, s, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

// ---------------------------------------------------------------------------
// Quaternions
// ---------------------------------------------------------------------------

/// Rotation matrix to quaternion via Shepperd's method.
///
/// The branch is picked on the largest of the trace and the diagonal
/// entries, which keeps the divisor well away from zero for every rotation.
pub fn rotation_to_quaternion(r: &[f64; 9]) -> [f64; 4] {
    let mut q = [0.0f64; 4];
    let trace = r[0] + r[4] + r[8];
    let n4;
    if trace > 0.0 {
        q[1] = r[5] - r[7];
        q[2] = r[6] - r[2];
        q[3] = r[1] - r[3];
        q[0] = trace + 1.0;
        n4 = q[0];
    } else if r[0] > r[4] && r[0] > r[8] {
        q[1] = 1.0 + r[0] - r[4] - r[8];
        q[2] = r[3] + r[1];
        q[3] = r[6] + r[2];
        q[0] = r[5] - r[7];
        n4 = q[1];
    } else if r[4] > r[8] {
        q[1] = r[3] + r[1];
        q[2] = 1.0 + r[4] - r[0] - r[8];
        q[3] = r[7] + r[5];
        q[0] = r[6] - r[2];
        n4 = q[2];
    } else {
        q[1] = r[6] + r[2];
        q[2] = r[7] + r[5];
        q[3] = 1.0 + r[8] - r[0] - r[4];
        q[0] = r[1] - r[3];
        n4 = q[3];
    }
    let factor = 0.5 / n4.sqrt();
    for v in &mut q {
        *v *= factor;
    }
    q
}

/// Unit quaternion `(w, x, y, z)` to rotation matrix.
pub fn quaternion_to_rotation(q: &[f64; 4]) -> [f64; 9] {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    let mut r = [0.0f64; 9];

    r[0] = x * x - y * y - z * z + w * w;
    r[4] = -x * x + y * y - z * z + w * w;
    r[8] = -x * x - y * y + z * z + w * w;

    let (t1, t2) = (x * y, z * w);
    r[1] = 2.0 * (t1 + t2);
    r[3] = 2.0 * (t1 - t2);

    let (t1, t2) = (x * z, y * w);
    r[2] = 2.0 * (t1 - t2);
    r[6] = 2.0 * (t1 + t2);

    let (t1, t2) = (y * z, x * w);
    r[5] = 2.0 * (t1 + t2);
    r[7] = 2.0 * (t1 - t2);
    r
}

/// Normalize a quaternion in place. Zero quaternions become the identity.
pub fn normalize_quaternion(q: &mut [f64; 4]) {
    let n = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if n > 0.0 {
        for v in q.iter_mut() {
            *v /= n;
        }
    } else {
        *q = [1.0, 0.0, 0.0, 0.0];
    }
}

// ---------------------------------------------------------------------------
// Glyph frame
// ---------------------------------------------------------------------------

/// Transform that carries `p` to the origin and rotates `n` onto +x.
///
/// The rotation axis is the cross product of `n` with the x axis, projected
/// so it has no x component; when `n` already lies on the x axis the y axis
/// is used instead.
pub fn glyph_transform(p: &[f64; 3], n: &[f64; 3]) -> ([f64; 9], [f64; 3]) {
    let angle = n[0].clamp(-1.0, 1.0).acos();
    let mut axis = [0.0, n[2], -n[1]];
    if n[1] == 0.0 && n[2] == 0.0 {
        axis = [0.0, 1.0, 0.0];
    } else {
        let an = (axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        if an > EPS {
            axis[1] /= an;
            axis[2] /= an;
        }
    }
    let r = axis_angle_to_rotation(&axis, angle);
    let t = mat_mul331(&r, &[-p[0], -p[1], -p[2]]);
    (r, t)
}

// ---------------------------------------------------------------------------
// Symmetric 3x3 eigen analysis
// ---------------------------------------------------------------------------

/// Eigenvector of the smallest eigenvalue of a symmetric 3x3 matrix.
///
/// Eigenvalues come from the trigonometric solution of the characteristic
/// cubic; the eigenvector is the largest cross product of rows of
/// `A - lambda I`. Falls back to a coordinate axis for (near-)isotropic
/// input, where every direction is an eigenvector anyway.
pub fn eigen_symmetric3_lowest(c: &[[f64; 3]; 3]) -> [f64; 3] {
    let p1 = c[0][1] * c[0][1] + c[0][2] * c[0][2] + c[1][2] * c[1][2];
    if p1 < 1e-300 {
        // Already diagonal.
        let mut min_i = 0;
        for i in 1..3 {
            if c[i][i] < c[min_i][min_i] {
                min_i = i;
            }
        }
        let mut v = [0.0; 3];
        v[min_i] = 1.0;
        return v;
    }

    let q = (c[0][0] + c[1][1] + c[2][2]) / 3.0;
    let p2 = (c[0][0] - q).powi(2) + (c[1][1] - q).powi(2) + (c[2][2] - q).powi(2) + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();

    // B = (A - qI) / p
    let mut b = [[0.0f64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            b[i][j] = c[i][j] / p;
        }
        b[i][i] -= q / p;
    }
    let det_b = b[0][0] * (b[1][1] * b[2][2] - b[1][2] * b[2][1])
        - b[0][1] * (b[1][0] * b[2][2] - b[1][2] * b[2][0])
        + b[0][2] * (b[1][0] * b[2][1] - b[1][1] * b[2][0]);
    let r = (det_b / 2.0).clamp(-1.0, 1.0);
    let phi = r.acos() / 3.0;

    // Smallest of the three roots.
    let lambda = q + 2.0 * p * (phi + 2.0 * std::f64::consts::FRAC_PI_3 * 2.0).cos();

    let rows = [
        [c[0][0] - lambda, c[0][1], c[0][2]],
        [c[1][0], c[1][1] - lambda, c[1][2]],
        [c[2][0], c[2][1], c[2][2] - lambda],
    ];
    let candidates = [
        cross3(&rows[0], &rows[1]),
        cross3(&rows[0], &rows[2]),
        cross3(&rows[1], &rows[2]),
    ];
    let mut best = candidates[0];
    let mut best_norm = norm3(&best);
    for cand in &candidates[1..] {
        let n = norm3(cand);
        if n > best_norm {
            best = *cand;
            best_norm = n;
        }
    }
    if best_norm < 1e-12 {
        return [1.0, 0.0, 0.0];
    }
    [best[0] / best_norm, best[1] / best_norm, best[2] / best_norm]
}
