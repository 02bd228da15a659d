//! Label injector vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use bytes::BytesMut;

use promrelay_core::exposition::LabelInjector;
use promrelay_core::labels::LabelFragments;

use vector_loader::{load, VECTORS};

fn fragments(v: &[String]) -> Arc<LabelFragments> {
    Arc::new(LabelFragments::new(v.to_vec()))
}

fn non_blank_lines(b: &[u8]) -> usize {
    b.split(|&c| c == b'\n').filter(|l| !l.is_empty()).count()
}

#[test]
fn whole_body_vectors() {
    for f in VECTORS {
        let v = load(f);
        let out = LabelInjector::rewrite_all(fragments(&v.fragments), v.input.as_bytes());
        assert_eq!(
            String::from_utf8(out.to_vec()).unwrap(),
            v.expect,
            "vector={}",
            v.description
        );
    }
}

#[test]
fn chunk_boundaries_do_not_change_output() {
    for f in VECTORS {
        let v = load(f);
        for size in [1usize, 2, 3, 7, 16, 64] {
            let mut inj = LabelInjector::new(fragments(&v.fragments));
            let mut out = BytesMut::new();
            for chunk in v.input.as_bytes().chunks(size) {
                inj.feed(chunk, &mut out);
            }
            inj.finish(&mut out);
            assert_eq!(
                String::from_utf8(out.to_vec()).unwrap(),
                v.expect,
                "vector={} chunk={size}",
                v.description
            );
        }
    }
}

#[test]
fn line_count_is_preserved() {
    for f in VECTORS {
        let v = load(f);
        let out = LabelInjector::rewrite_all(fragments(&v.fragments), v.input.as_bytes());
        assert_eq!(
            non_blank_lines(&out),
            non_blank_lines(v.input.as_bytes()),
            "vector={}",
            v.description
        );
    }
}

#[test]
fn complete_lines_are_emitted_before_finish() {
    let mut inj = LabelInjector::new(fragments(&["job=\"A\"".to_string()]));
    let mut out = BytesMut::new();
    inj.feed(b"up 1\nother 2", &mut out);
    assert_eq!(&out[..], b"up{job=\"A\"} 1\n");
    inj.feed(b"\n", &mut out);
    assert_eq!(&out[..], b"up{job=\"A\"} 1\nother{job=\"A\"} 2\n");
    inj.finish(&mut out);
    assert_eq!(inj.stats().lines, 2);
    assert_eq!(inj.stats().rewritten, 2);
}

#[test]
fn oversized_line_passes_through_unmodified() {
    let long = format!("big{{x=\"{}\"}} 1", "a".repeat(64));
    let body = format!("{long}\nup 1\n");

    let mut inj = LabelInjector::new(fragments(&["job=\"A\"".to_string()])).with_max_line_bytes(16);
    let mut out = BytesMut::new();
    for chunk in body.as_bytes().chunks(8) {
        inj.feed(chunk, &mut out);
    }
    inj.finish(&mut out);

    let expect = format!("{long}\nup{{job=\"A\"}} 1\n");
    assert_eq!(String::from_utf8(out.to_vec()).unwrap(), expect);
    assert_eq!(inj.stats().oversized, 1);
}
