//! Bundled trace-to-requirement matchers

use crate::scope::{MatchParams, TraceMatcher};
use covtrace_core::structure::leaf_paths;
use std::rc::Rc;

/// Resolve a traced name such as `REQ-12` to the first requirement in the
/// scope's category whose name starts with it.
///
/// Requirement names carry their ids as a prefix (`REQ-12 locks after three
/// attempts`), so tests only need to name the id.
pub fn by_prefix() -> TraceMatcher {
    Rc::new(|params: &MatchParams<'_>| {
        let prefix = params.name.trim();
        if prefix.is_empty() {
            return None;
        }
        let branch = params.branch?.as_category()?;
        let found = leaf_paths(branch)
            .into_iter()
            .find(|path| path.last().is_some_and(|name| starts_with_id(name, prefix)))?;
        Some([params.category_path, found.as_slice()].concat())
    })
}

/// Split a traced name on `separator` and take it as a path relative to the
/// scope's category, so `"High.Req A"` addresses `High / Req A`.
pub fn by_separator(separator: &'static str) -> TraceMatcher {
    Rc::new(move |params: &MatchParams<'_>| {
        let mut path = params.category_path.to_vec();
        path.extend(
            params
                .name
                .split(separator)
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(str::to_string),
        );
        (path.len() > params.category_path.len()).then_some(path)
    })
}

// `REQ-1` must not match `REQ-12 ...`.
fn starts_with_id(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix).is_some_and(|rest| {
        rest.is_empty() || !rest.starts_with(|c: char| c.is_ascii_alphanumeric())
    })
}
