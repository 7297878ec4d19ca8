//! Integration test: value lifecycles across many frames.
//!
//! Covers the paths that cross pool boundaries (mark from a reference,
//! `live` of a marked value, premark-then-mark) and the bookkeeping the
//! binding layer reads back (stats, leak report).

use mathpool_arena::{MathConfig, MathContext, MathFlags, MathType, ValueReader};
use mathpool_test_utils::fixtures::{assert_bits_eq, numbered_vec4s, scale};
use mathpool_test_utils::MockValueReader;

fn ctx(max_pages: u32) -> MathContext {
    MathContext::new(MathConfig::new(max_pages)).unwrap()
}

/// Sum of every float behind `id`; stands in for numeric-layer code.
fn total<R: ValueReader>(reader: &R, id: mathpool_arena::MathId) -> f32 {
    reader.read(id).iter().sum()
}

#[test]
fn numeric_code_runs_against_context_and_mock() {
    let mut c = ctx(1);
    let values = numbered_vec4s(2, 1.0);
    let h = c.import(Some(&values), MathType::Vec4, 2).unwrap();

    let mut mock = MockValueReader::new();
    let m = mock.add(MathType::Vec4, values.clone());

    assert_eq!(total(&c, h), total(&mock, m));
    assert_eq!(c.size_of(h), mock.size_of(m));
    assert_eq!(ValueReader::type_of(&c, h), mock.type_of(m));
}

#[test]
#[allow(unsafe_code)]
fn reference_marked_into_heap_outlives_buffer_window() {
    let mut c = ctx(1);
    let buffer = numbered_vec4s(3, 10.0);
    // SAFETY: buffer outlives every use of the reference handle.
    let r = unsafe { c.reference(buffer.as_ptr(), MathType::Vec4, 3) }.unwrap();
    let kept = c.mark(r).unwrap();
    c.frame();
    c.frame();
    assert!(!c.valid(r));
    assert!(c.valid(kept));
    assert_eq!(c.size_of(kept), 3);
    assert_bits_eq(c.value(kept), &buffer);
}

#[test]
fn live_keeps_scratch_alive_frame_after_frame() {
    let mut c = ctx(2);
    let mut h = c.matrix(&scale(2.0, 3.0, 4.0)).unwrap();
    for _ in 0..50 {
        c.frame();
        h = c.live(h).unwrap();
    }
    assert_eq!(h.location(), c.live(h).unwrap().location());
    assert_bits_eq(c.value(h), &scale(2.0, 3.0, 4.0));
}

#[test]
fn premark_result_written_then_kept() {
    let mut c = ctx(1);
    let out = c.premark(MathType::Matrix, 1).unwrap();
    c.init(out).copy_from_slice(&scale(5.0, 5.0, 5.0));
    let kept = c.mark(out).unwrap();
    assert_eq!(kept, out);
    for _ in 0..3 {
        c.frame();
    }
    assert_bits_eq(c.value(kept), &scale(5.0, 5.0, 5.0));
    assert_eq!(c.stats().marked_objects, 1);
}

#[test]
fn stats_and_leak_report_follow_marks() {
    let mut c = ctx(2);
    let mut marked = Vec::new();
    for i in 0..8 {
        let t = c.vec4(&[i as f32; 4]).unwrap();
        marked.push(c.mark(t).unwrap());
    }
    assert_eq!(c.stats().marked_objects, 8);
    assert_eq!(c.stats().marked_slots, 8);
    assert_eq!(c.leak_report().values().sum::<usize>(), 8);

    for &m in &marked[..5] {
        c.unmark(m).unwrap();
    }
    c.frame();
    let stats = c.stats();
    assert_eq!(stats.marked_objects, 3);
    assert_eq!(stats.marked_slots, 3);
    assert_eq!(c.marked_entries().count(), 3);
    let report = c.leak_report();
    assert_eq!(report.len(), 1);
    let (site, objects) = report.first().unwrap();
    assert!(site.file().ends_with("lifecycle.rs"));
    assert_eq!(*objects, 3);
}

#[test]
fn flags_are_independent_of_storage() {
    let mut c = ctx(1);
    c.set_flag(MathFlags::ORIGIN_BOTTOM_LEFT, true);
    c.frame();
    assert!(c.flag(MathFlags::ORIGIN_BOTTOM_LEFT));
    assert!(!c.flag(MathFlags::HOMOGENEOUS_DEPTH));
}

#[test]
fn display_shows_lifetime_class() {
    let mut c = ctx(1);
    let t = c.vec4(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    let m = c.mark(t).unwrap();
    c.mark(m).unwrap();
    assert_eq!(c.display(m).to_string(), "[v4 (marked/2) : 1 2 3 4]");
    let k = c.constant(t).unwrap();
    assert_eq!(c.display(k).to_string(), "[v4 (constant) : 1 2 3 4]");
}
