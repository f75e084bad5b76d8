// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `patcher.rs`

use crate::patcher::{append_connectivity_block, strip_connectivity_block};

const BASE_COREFILE: &str = ".:53 {\n    errors\n    health {\n       lameduck 5s\n    }\n    ready\n    forward . /etc/resolv.conf\n    cache 30\n}\n";

#[test]
fn test_strip_leaves_untouched_blob_alone() {
    assert_eq!(strip_connectivity_block(BASE_COREFILE), BASE_COREFILE);
}

#[test]
fn test_append_adds_fenced_block() {
    let patched = append_connectivity_block(BASE_COREFILE, "clusters.xcc.test", "1.2.3.4");

    assert!(patched.starts_with(BASE_COREFILE));
    assert!(patched.contains("### BEGIN CROSS CLUSTER CONNECTIVITY\n"));
    assert!(patched.contains("clusters.xcc.test:53 {\n    forward . 1.2.3.4\n}\n"));
    assert!(patched.ends_with("### END CROSS CLUSTER CONNECTIVITY\n"));
}

#[test]
fn test_append_is_idempotent() {
    let once = append_connectivity_block(BASE_COREFILE, "clusters.xcc.test", "1.2.3.4");
    let twice = append_connectivity_block(&once, "clusters.xcc.test", "1.2.3.4");

    assert_eq!(once, twice);
}

#[test]
fn test_append_replaces_stale_block() {
    let stale = append_connectivity_block(BASE_COREFILE, "clusters.xcc.test", "10.0.0.1");
    let fresh = append_connectivity_block(&stale, "clusters.xcc.test", "1.2.3.4");

    assert!(!fresh.contains("10.0.0.1"));
    assert!(fresh.contains("forward . 1.2.3.4"));
    assert_eq!(
        fresh,
        append_connectivity_block(BASE_COREFILE, "clusters.xcc.test", "1.2.3.4")
    );
}

#[test]
fn test_append_replaces_block_of_any_shape() {
    // The fenced region is stripped regardless of its contents.
    let mangled = format!(
        "{BASE_COREFILE}### BEGIN CROSS CLUSTER CONNECTIVITY\ngarbage in here\nmore garbage\n### END CROSS CLUSTER CONNECTIVITY\n"
    );
    let fresh = append_connectivity_block(&mangled, "clusters.xcc.test", "1.2.3.4");

    assert!(!fresh.contains("garbage"));
    assert_eq!(
        fresh,
        append_connectivity_block(BASE_COREFILE, "clusters.xcc.test", "1.2.3.4")
    );
}

#[test]
fn test_append_preserves_non_sentinel_blocks() {
    // Scenario: a blob with an unrelated block gains the fenced block
    // appended after it; everything outside the fence is byte-identical.
    let with_other_block = format!("{BASE_COREFILE}example.org:53 {{\n    forward . 9.9.9.9\n}}\n");
    let patched = append_connectivity_block(&with_other_block, "clusters.xcc.test", "1.2.3.4");

    assert!(patched.starts_with(with_other_block.as_str()));
    assert!(patched.contains("forward . 1.2.3.4"));

    let repatched = append_connectivity_block(&patched, "clusters.xcc.test", "1.2.3.4");
    assert_eq!(patched, repatched);
}

#[test]
fn test_strip_handles_unterminated_block() {
    let unterminated = format!("{BASE_COREFILE}### BEGIN CROSS CLUSTER CONNECTIVITY\ndangling\n");
    assert_eq!(strip_connectivity_block(&unterminated), BASE_COREFILE);
}

#[test]
fn test_append_to_blob_without_trailing_newline() {
    let no_newline = ".:53 {\n    forward . /etc/resolv.conf\n}";
    let patched = append_connectivity_block(no_newline, "clusters.xcc.test", "1.2.3.4");

    assert!(patched.starts_with(".:53 {\n    forward . /etc/resolv.conf\n}\n### BEGIN"));
    assert_eq!(
        patched,
        append_connectivity_block(&patched, "clusters.xcc.test", "1.2.3.4")
    );
}
