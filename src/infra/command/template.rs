//! Expansion of the management tool's argument template.

use crate::core::event::PendingEvent;

/// Expand every placeholder in `template` for `event`.
///
/// Recognised placeholders are `{url}`, `{site_id}`, `{hook}`,
/// `{timestamp}`, `{instance}` and `{args}` (compact JSON). Anything else,
/// including unknown `{names}`, is copied through unchanged.
#[must_use]
pub fn expand(template: &str, event: &PendingEvent) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };

        let name = &tail[1..close];
        match name {
            "url" => out.push_str(&event.site.url),
            "site_id" => out.push_str(&event.site.id),
            "hook" => out.push_str(&event.hook),
            "timestamp" => out.push_str(&event.timestamp.to_string()),
            "instance" => out.push_str(event.instance()),
            "args" => out.push_str(&event.args.to_string()),
            _ => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Expand a whole argument list.
#[must_use]
pub fn expand_all(templates: &[String], event: &PendingEvent) -> Vec<String> {
    templates.iter().map(|t| expand(t, event)).collect()
}
