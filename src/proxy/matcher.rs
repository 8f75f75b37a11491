//! Manifest pull matching

use axum::http::Method;
use std::sync::OnceLock;

use crate::models::ManifestPull;

/// `/v2/<name>/manifests/<reference>`; anchored at the start only
const MANIFEST_PATTERN: &str =
    r"^/v2/((?:[a-z0-9]+(?:[._-][a-z0-9]+)*/)+)manifests/([\w][\w.:-]{0,127})";

fn manifest_regex() -> &'static regex_lite::Regex {
    static RE: OnceLock<regex_lite::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex_lite::Regex::new(MANIFEST_PATTERN).expect("Invalid regex pattern for manifest pulls")
    })
}

/// Match a manifest pull
///
/// Returns `None` for anything but a GET of a manifest. The repository is
/// returned without its trailing slash and is not split into project and
/// repository here.
pub fn match_pull_manifest(method: &Method, path: &str) -> Option<ManifestPull> {
    if method != Method::GET {
        return None;
    }

    let caps = manifest_regex().captures(path)?;
    let repository = caps.get(1)?.as_str().trim_end_matches('/');
    let reference = caps.get(2)?.as_str();

    Some(ManifestPull::new(repository, reference))
}
