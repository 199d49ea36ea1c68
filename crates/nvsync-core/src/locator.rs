use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Anything identified by a resource locator (URL or path).
pub trait Located {
    fn locator(&self) -> &str;
}

/// The kind of engine resource a locator refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Volume,
    Mesh,
    MeshLayer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Volume => f.write_str("volume"),
            ResourceKind::Mesh => f.write_str("mesh"),
            ResourceKind::MeshLayer => f.write_str("mesh layer"),
        }
    }
}

/// Display name the engine derives from a locator: the last path segment,
/// without query string or fragment.
pub fn display_name(locator: &str) -> &str {
    let end = locator.find(['?', '#']).unwrap_or(locator.len());
    let path = locator[..end].trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}

/// Split items into first occurrences and the locators that were repeated.
///
/// The first spec for a locator wins; later duplicates are ignored.
pub fn dedup_by_locator<T: Located>(items: &[T]) -> (Vec<&T>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(items.len());
    let mut duplicates = Vec::new();
    for item in items {
        if seen.insert(item.locator()) {
            unique.push(item);
        } else {
            duplicates.push(item.locator().to_string());
        }
    }
    (unique, duplicates)
}

/// Value of `next` when it is set and differs from `applied`.
pub(crate) fn changed<T: PartialEq + Clone>(next: &Option<T>, applied: &Option<T>) -> Option<T> {
    match next {
        Some(value) if applied.as_ref() != Some(value) => Some(value.clone()),
        _ => None,
    }
}
