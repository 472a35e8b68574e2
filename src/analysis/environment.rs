//! Environment inference from workflow names.
//!
//! Workflow names carry their environment as a bracketed prefix, e.g.
//! `[LIVE] DNA extraction`. Names without brackets are searched as a whole.

use crate::models::Environment;

/// Keywords checked in order; the first substring hit wins.
const ENVIRONMENT_KEYWORDS: &[(&str, Environment)] = &[
    ("live", Environment::Live),
    ("success", Environment::Live),
    ("testing", Environment::Test),
    ("test", Environment::Test),
    ("qa/uat", Environment::Uat),
    ("uat", Environment::Uat),
    ("qa", Environment::Uat),
    ("experimental", Environment::Experimental),
    ("archive", Environment::Archived),
];

/// Infer the environment of a workflow from its name.
///
/// The tag inside a leading `[...]` is the search space when present,
/// otherwise the whole name. Matching is case-insensitive. Names with no
/// recognised keyword, and missing names, are [`Environment::Unlabeled`].
pub fn infer_environment(workflow_name: Option<&str>) -> Environment {
    let Some(name) = workflow_name else {
        return Environment::Unlabeled;
    };

    let text = name.trim().to_lowercase();
    let search_space = bracketed_tag(&text)
        .filter(|tag| !tag.is_empty())
        .unwrap_or(&text);

    ENVIRONMENT_KEYWORDS
        .iter()
        .find(|(keyword, _)| search_space.contains(keyword))
        .map(|(_, env)| *env)
        .unwrap_or(Environment::Unlabeled)
}

/// Trimmed text between a leading `[` and the first `]`.
fn bracketed_tag(text: &str) -> Option<&str> {
    let rest = text.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    Some(rest[..end].trim())
}
