//! Integration test: the documented allocator scenarios and properties.
//!
//! Each test drives a fresh `MathContext` through one behaviour callers
//! rely on: transient expiry, refcounted marking, checkpoint rollback and
//! zero-storage identities.

use mathpool_arena::{MathConfig, MathContext, MathError, MathId, MathLocation, MathType};
use mathpool_core::{IDENTITY_MATRIX, IDENTITY_VEC4};
use mathpool_test_utils::fixtures::{
    assert_bits_eq, import_numbered, numbered_vec4s, rotation_z, translation,
};

fn ctx(max_pages: u32) -> MathContext {
    MathContext::new(MathConfig::new(max_pages)).unwrap()
}

// ── Scenario A: ring reuse after a frame ────────────────────────────

#[test]
fn full_page_then_frame_then_one_more() {
    let mut c = ctx(1);
    for i in 0..2047 {
        c.vec4(&[i as f32; 4]).unwrap();
    }
    c.frame();
    let last = c.vec4(&[1.0; 4]).unwrap();
    assert!(c.valid(last));
}

#[test]
fn vacated_page_is_reused_from_the_start() {
    let mut c = ctx(1);
    let first = c.import(None, MathType::Vec4, 2048).unwrap();
    c.frame();
    // The previous epoch still owns the whole page.
    assert!(matches!(
        c.vec4(&[0.0; 4]),
        Err(MathError::CapacityExceeded { .. })
    ));
    c.frame();
    assert!(!c.valid(first));
    let again = c.vec4(&[2.0; 4]).unwrap();
    assert_eq!(again.location(), MathLocation::Transient { epoch: 2, index: 0 });
    assert_eq!(c.value(again), &[2.0; 4]);
}

// ── Scenario B: refcounted marking and slot reuse ──────────────────

#[test]
fn double_mark_unmark_then_reuse() {
    let mut c = ctx(1);
    let t = c.vec4(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    let m = c.mark(t).unwrap();
    assert_eq!(c.mark(m).unwrap(), m);

    c.frame();
    assert!(c.valid(m));
    assert_eq!(c.unmark(m), Ok(1));
    assert!(c.is_marked(m));
    assert_eq!(c.unmark(m), Ok(0));
    assert!(!c.is_marked(m));
    c.frame();
    assert!(!c.valid(m));

    let t2 = c.vec4(&[5.0, 6.0, 7.0, 8.0]).unwrap();
    let m2 = c.mark(t2).unwrap();
    assert_eq!(m2.location(), m.location());
    assert_eq!(c.value(m2), &[5.0, 6.0, 7.0, 8.0]);
}

#[test]
fn second_unmark_of_single_mark_fails() {
    let mut c = ctx(1);
    let t = c.quat(&IDENTITY_VEC4).unwrap();
    let m = c.mark(t).unwrap();
    assert!(c.unmark(m).is_ok());
    assert_eq!(c.unmark(m), Err(MathError::AlreadyReleased));
}

// ── Scenario C: checkpoint / recover ────────────────────────────────

#[test]
fn recover_at_fresh_checkpoint_is_noop() {
    let mut c = ctx(1);
    let before = c.vec4(&[1.0; 4]).unwrap();
    let cp = c.checkpoint();
    c.recover(cp);
    assert!(c.valid(before));
    let next = c.vec4(&[2.0; 4]).unwrap();
    assert_eq!(c.value(before), &[1.0; 4]);
    assert_eq!(c.value(next), &[2.0; 4]);
}

#[test]
fn recover_discards_ten_scratch_vectors() {
    let mut c = ctx(1);
    let kept: Vec<MathId> = (0..5).map(|i| c.vec4(&[i as f32; 4]).unwrap()).collect();
    let cp = c.checkpoint();
    let scratch: Vec<MathId> = (0..10).map(|i| c.vec4(&[i as f32; 4]).unwrap()).collect();
    c.recover(cp);
    assert!(scratch.iter().all(|&h| !c.valid(h)));
    assert!(kept.iter().all(|&h| c.valid(h)));
    for (i, &h) in kept.iter().enumerate() {
        assert_eq!(c.value(h), &[i as f32; 4]);
    }
}

#[test]
#[should_panic(expected = "recover past the retained window")]
fn recover_across_frame_panics() {
    let mut c = ctx(1);
    c.vec4(&[1.0; 4]).unwrap();
    let cp = c.checkpoint();
    c.vec4(&[1.0; 4]).unwrap();
    c.frame();
    c.vec4(&[1.0; 4]).unwrap();
    c.recover(cp);
}

// ── Scenario D: identity constants ──────────────────────────────────

#[test]
fn identity_matrix_constant_needs_no_storage() {
    let mut c = ctx(1);
    let t = c.matrix(&IDENTITY_MATRIX).unwrap();
    let k = c.constant(t).unwrap();
    assert_eq!(k, MathId::identity(MathType::Matrix));
    assert!(k.is_identity());
    assert!(k.is_constant());
    assert_eq!(k.location(), MathLocation::Identity);
    assert_eq!(c.stats().constant_slots, 0);
    assert_bits_eq(c.value(k), &IDENTITY_MATRIX);
}

// ── Properties ──────────────────────────────────────────────────────

#[test]
fn import_round_trips_bit_exact() {
    let mut c = ctx(1);
    let m = translation(1.5, -2.0, f32::MIN_POSITIVE);
    let hm = c.matrix(&m).unwrap();
    let v = [f32::NAN, -0.0, f32::INFINITY, 1e-40];
    let hv = c.vec4(&v).unwrap();
    let hq = c.quat(&v).unwrap();
    assert_bits_eq(c.value(hm), &m);
    assert_bits_eq(c.value(hv), &v);
    assert_bits_eq(c.value(hq), &v);
}

#[test]
fn constant_is_idempotent_and_deduplicated() {
    let mut c = ctx(1);
    let r = rotation_z(0.25);
    let a = c.matrix(&r).unwrap();
    let b = c.matrix(&r).unwrap();
    let ka = c.constant(a).unwrap();
    assert_eq!(c.constant(ka).unwrap(), ka);
    assert_eq!(c.constant(b).unwrap(), ka);
    assert_eq!(c.stats().constant_slots, 4);
    // Constants survive any number of frames.
    for _ in 0..4 {
        c.frame();
    }
    assert!(c.valid(ka));
    assert_bits_eq(c.value(ka), &r);
}

#[test]
fn marked_elements_address_their_block() {
    let mut c = ctx(1);
    let t = import_numbered(&mut c, 6, 100.0);
    let m = c.mark(t).unwrap();
    let expected = numbered_vec4s(6, 100.0);
    for i in 0..6 {
        let e = c.element(m, i);
        assert_bits_eq(c.value(e), &expected[i as usize * 4..(i as usize + 1) * 4]);
    }

    // A second mark keeps views alive through one unmark.
    c.mark(m).unwrap();
    let view = c.element(m, 3);
    c.unmark(m).unwrap();
    c.frame();
    assert!(c.valid(view));
    c.unmark(m).unwrap();
    c.frame();
    assert!(!c.valid(view));
}

#[test]
fn marked_matrix_array_views() {
    let mut c = ctx(1);
    let mut values = Vec::new();
    values.extend_from_slice(&translation(1.0, 0.0, 0.0));
    values.extend_from_slice(&translation(0.0, 2.0, 0.0));
    let t = c.import(Some(&values), MathType::Matrix, 2).unwrap();
    let m = c.mark(t).unwrap();
    let second = c.element(m, 1);
    assert_eq!(c.type_of(second), MathType::Matrix);
    assert_bits_eq(c.value(second), &translation(0.0, 2.0, 0.0));
}

#[test]
fn transient_handles_expire_after_two_frames() {
    let mut c = ctx(4);
    for _ in 0..10 {
        let h = c.vec4(&[3.0; 4]).unwrap();
        assert!(c.valid(h));
        c.frame();
        assert!(c.valid(h));
        c.frame();
        assert!(!c.valid(h));
    }
}
