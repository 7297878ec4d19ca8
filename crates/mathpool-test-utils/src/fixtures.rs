//! Canonical values and bit-exact comparison helpers.
//!
//! - [`translation`], [`scale`] and [`rotation_z`] build column-major
//!   matrices with known contents.
//! - [`numbered_vec4s`] builds arrays whose every float is distinct, so an
//!   element read from the wrong slot is caught immediately.
//! - [`assert_bits_eq`] compares float slices bit for bit, treating `-0.0`
//!   and `0.0` as different and every NaN payload as itself.

use mathpool_arena::{MathContext, MathId};
use mathpool_core::IDENTITY_MATRIX;

/// A column-major translation matrix.
pub fn translation(x: f32, y: f32, z: f32) -> [f32; 16] {
    let mut m = IDENTITY_MATRIX;
    m[12] = x;
    m[13] = y;
    m[14] = z;
    m
}

/// A column-major scale matrix.
pub fn scale(x: f32, y: f32, z: f32) -> [f32; 16] {
    let mut m = IDENTITY_MATRIX;
    m[0] = x;
    m[5] = y;
    m[10] = z;
    m
}

/// A column-major rotation about Z by `radians`.
pub fn rotation_z(radians: f32) -> [f32; 16] {
    let (s, c) = radians.sin_cos();
    let mut m = IDENTITY_MATRIX;
    m[0] = c;
    m[1] = s;
    m[4] = -s;
    m[5] = c;
    m
}

/// `count` vectors whose floats are `start, start + 1, ...`.
pub fn numbered_vec4s(count: usize, start: f32) -> Vec<f32> {
    (0..count * 4).map(|i| start + i as f32).collect()
}

/// Assert two float slices are bit-identical.
#[track_caller]
pub fn assert_bits_eq(actual: &[f32], expected: &[f32]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(
            a.to_bits(),
            e.to_bits(),
            "float {i} differs: {a} ({:#010x}) vs {e} ({:#010x})",
            a.to_bits(),
            e.to_bits()
        );
    }
}

/// Import `count` numbered vectors as one array.
pub fn import_numbered(ctx: &mut MathContext, count: usize, start: f32) -> MathId {
    let values = numbered_vec4s(count, start);
    ctx.import(Some(&values), mathpool_core::MathType::Vec4, count as u32)
        .expect("fixture import fits")
}
