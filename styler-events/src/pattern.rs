//! Wildcard matching for namespaced event names.

/// Check whether a subscription pattern matches an emitted event name.
///
/// Patterns are `:`-separated segments. A `*` segment matches exactly
/// one event segment in that position. A pattern with fewer segments
/// than the event matches only when its final segment is `*`, which
/// then covers the remainder.
pub(crate) fn pattern_matches(pattern: &str, event: &str) -> bool {
    if pattern == event {
        return true;
    }
    if !pattern.contains('*') {
        return false;
    }

    let pattern_parts: Vec<&str> = pattern.split(':').collect();
    let event_parts: Vec<&str> = event.split(':').collect();

    for (i, part) in pattern_parts.iter().enumerate() {
        match event_parts.get(i) {
            None => return false,
            Some(segment) => {
                if *part != "*" && part != segment {
                    return false;
                }
            }
        }
    }

    if pattern_parts.len() < event_parts.len() {
        return pattern_parts.last() == Some(&"*");
    }

    pattern_parts.len() == event_parts.len()
}
