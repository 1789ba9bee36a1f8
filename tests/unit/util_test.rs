//! Tests for label utilities

use cron_control_runner::util::{sanitize_label, short_reason, LabelCap, OVERFLOW_LABEL};

#[test]
fn test_short_reason_takes_last_line() {
    let output = "PHP Warning: something\n\nError: Could not connect to database.\n\n";
    assert_eq!(
        short_reason(output).as_deref(),
        Some("Could not connect to database.")
    );
    assert_eq!(short_reason("  \n \n"), None);
}

#[test]
fn test_short_reason_respects_char_boundaries() {
    let long = "é".repeat(200);
    let reason = short_reason(&long).unwrap();
    assert!(reason.len() <= 120);
    assert!(reason.chars().all(|c| c == 'é'));
}

#[test]
fn test_sanitize_label_is_bounded() {
    assert_eq!(sanitize_label("Could not connect!"), "could_not_connect");
    assert_eq!(sanitize_label("!!!"), "unknown");
    assert!(sanitize_label(&"x".repeat(100)).len() <= 32);
}

#[test]
fn test_label_cap_is_shared_across_threads() {
    let cap = std::sync::Arc::new(LabelCap::new(4));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cap = std::sync::Arc::clone(&cap);
            std::thread::spawn(move || cap.label(&format!("site-{i}")).into_owned())
        })
        .collect();
    let labels: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(cap.admitted(), 4);
    assert_eq!(labels.iter().filter(|l| *l == OVERFLOW_LABEL).count(), 4);
}
