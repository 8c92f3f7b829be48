//! Canonical item URLs.
//!
//! A canonical URL is the identity of a record and the dedup key of the
//! frontier. Canonicalization:
//!
//! 1. Parse; only `http`/`https` are accepted, and `http` becomes `https`
//! 2. Lowercase the host and drop a leading `www.` or `m.`
//! 3. Drop the fragment
//! 4. Keep only stable identifier query parameters (`v`), sorted
//! 5. Drop a trailing slash from non-root paths
//!
//! The result parses back to itself, so canonicalization is idempotent.

use url::Url;

use crate::error::AppError;

/// Query parameters that identify an item. Everything else (playlist
/// position, timestamps, tracking) is mutable and discarded.
const STABLE_PARAMS: &[&str] = &["v"];

const HOST_PREFIXES: &[&str] = &["www.", "m."];

/// Canonicalize an absolute URL.
pub fn canonicalize(raw: &str) -> Result<String, AppError> {
    let url = Url::parse(raw.trim()).map_err(|e| AppError::InvalidUrl(format!("{raw}: {e}")))?;
    canonicalize_parsed(url)
}

/// Resolve `href` (possibly relative, e.g. `/watch?v=abc`) against `base`
/// without canonicalizing it.
pub fn resolve_link(base: &str, href: &str) -> Result<String, AppError> {
    join(base, href).map(String::from)
}

/// Resolve `href` against `base`, then canonicalize it.
pub fn canonicalize_link(base: &str, href: &str) -> Result<String, AppError> {
    canonicalize_parsed(join(base, href)?)
}

fn join(base: &str, href: &str) -> Result<Url, AppError> {
    let base = Url::parse(base.trim()).map_err(|e| AppError::InvalidUrl(format!("{base}: {e}")))?;
    base.join(href.trim())
        .map_err(|e| AppError::InvalidUrl(format!("{href}: {e}")))
}

/// Returns true if the URL addresses a single item page rather than a list.
pub fn is_item_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path();
    (path == "/watch" && parsed.query_pairs().any(|(k, v)| k == "v" && !v.is_empty()))
        || path.starts_with("/shorts/")
}

fn canonicalize_parsed(mut url: Url) -> Result<String, AppError> {
    let scheme = url.scheme().to_string();
    match scheme.as_str() {
        "https" => {}
        "http" => {
            url.set_scheme("https")
                .map_err(|()| AppError::InvalidUrl(format!("{url}: cannot switch to https")))?;
        }
        other => {
            return Err(AppError::InvalidUrl(format!(
                "{url}: scheme '{other}' is not allowed (only http/https)"
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| AppError::InvalidUrl(format!("{url}: missing host")))?
        .to_lowercase();
    let mut trimmed = host.as_str();
    // Prefixes can stack (`www.m.`); strip until none match.
    while let Some(rest) = HOST_PREFIXES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(*prefix))
        .filter(|rest| !rest.is_empty())
    {
        trimmed = rest;
    }
    if trimmed != host {
        let trimmed = trimmed.to_string();
        url.set_host(Some(trimmed.as_str()))
            .map_err(|e| AppError::InvalidUrl(format!("{url}: {e}")))?;
    }

    url.set_fragment(None);

    let mut stable: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, v)| STABLE_PARAMS.contains(&&**k) && !v.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    stable.sort();
    stable.dedup_by(|a, b| a.0 == b.0);
    if stable.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(stable);
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let path = path.trim_end_matches('/').to_string();
        let path = if path.is_empty() { "/".to_string() } else { path };
        url.set_path(&path);
    }

    Ok(url.to_string())
}
