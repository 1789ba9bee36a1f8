//! Bounded metric label helpers.
//!
//! Site identifiers and tool-provided failure reasons come from untrusted,
//! potentially unbounded sets. Everything that ends up as a metric label
//! passes through one of these helpers first.

use std::borrow::Cow;
use std::collections::HashSet;

use parking_lot::Mutex;

/// Label used when no reason text is available.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Label used for values beyond the configured cap.
pub const OVERFLOW_LABEL: &str = "other";

const MAX_LABEL_LEN: usize = 32;
const MAX_REASON_LEN: usize = 120;

/// Caps the number of distinct values of one label handed to the metrics backend.
///
/// The first `max` distinct values keep their own label. Any value seen after
/// that is reported as [`OVERFLOW_LABEL`].
#[derive(Debug)]
pub struct LabelCap {
    max: usize,
    seen: Mutex<HashSet<String>>,
}

impl LabelCap {
    /// Create a cap admitting at most `max` distinct values.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Map a raw value to the label it should be reported under.
    pub fn label<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.is_empty() {
            return Cow::Borrowed(UNKNOWN_LABEL);
        }
        let mut seen = self.seen.lock();
        if seen.contains(value) {
            return Cow::Borrowed(value);
        }
        if seen.len() < self.max {
            seen.insert(value.to_owned());
            return Cow::Borrowed(value);
        }
        Cow::Borrowed(OVERFLOW_LABEL)
    }

    /// Number of distinct values admitted so far.
    #[must_use]
    pub fn admitted(&self) -> usize {
        self.seen.lock().len()
    }
}

/// Normalize free-form text into a short `snake_case` label.
///
/// Only `[a-z0-9_]` survives, runs of other characters collapse into a single
/// underscore, and the result is truncated. Empty input yields `unknown`.
#[must_use]
pub fn sanitize_label(text: &str) -> String {
    let mut out = String::with_capacity(MAX_LABEL_LEN);
    let mut pending_sep = false;
    for c in text.chars() {
        if out.len() >= MAX_LABEL_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out.truncate(MAX_LABEL_LEN);
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        UNKNOWN_LABEL.to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Extract a short, single-line reason from tool output.
///
/// Takes the last non-empty line, strips a leading `Error:` marker and caps the
/// length. Returns `None` when the output has no printable content.
#[must_use]
pub fn short_reason(output: &str) -> Option<String> {
    let line = output.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Error:")
        .or_else(|| line.strip_prefix("error:"))
        .map_or(line, str::trim);
    if line.is_empty() {
        return None;
    }
    let mut end = line.len().min(MAX_REASON_LEN);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    Some(line[..end].to_owned())
}
