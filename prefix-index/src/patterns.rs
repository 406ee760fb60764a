//! URL canonicalization and Safe-Browsing-style decomposition into check patterns.
//!
//! A canonical URL here has its scheme, port, credentials and fragment removed:
//! `http://User@Example.COM:8080/a/./b/../c?q=1#top` becomes `example.com/a/c?q=1`.
//! Each canonical URL expands into at most five host suffixes times six path
//! prefixes, e.g. `a.b.c/1/2.html?param=1` yields
//!
//! ```text
//! a.b.c/1/2.html?param=1   a.b.c/1/2.html   a.b.c/   a.b.c/1/
//! b.c/1/2.html?param=1     b.c/1/2.html     b.c/     b.c/1/
//! ```

use std::collections::HashSet;

use tracing::{debug, instrument};
use url::{Host, Url};

use crate::error::{Error, Result};

/// Most host suffixes tried besides the exact host.
const MAX_HOST_SUFFIXES: usize = 4;

/// Host suffixes are taken from at most this many trailing components.
const MAX_HOST_COMPONENTS: usize = 5;

/// Most root-anchored path prefixes tried besides the exact path.
const MAX_PATH_PREFIXES: usize = 4;

/// Produces the check patterns for one URL.
pub trait PatternSource {
    /// Fails when the URL is malformed or cannot be decomposed. Callers skip such URLs.
    fn generate_patterns(&self, url: &str) -> Result<Vec<String>>;
}

/// Host-suffix by path-prefix decomposition over [`canonical_url`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlDecomposer;

impl PatternSource for UrlDecomposer {
    fn generate_patterns(&self, url: &str) -> Result<Vec<String>> {
        let parsed = parse(url)?;
        let host = canonical_host(url, &parsed)?;
        let path = canonical_path(parsed.path());

        let hosts = host_suffixes(&host, matches!(parsed.host(), Some(Host::Domain(_))));
        let paths = path_prefixes(&path, parsed.query());

        let patterns = hosts
            .iter()
            .flat_map(|h| paths.iter().map(move |p| format!("{h}{p}")))
            .collect();
        Ok(dedup_preserving_order(patterns))
    }
}

impl<S: PatternSource + ?Sized> PatternSource for &S {
    fn generate_patterns(&self, url: &str) -> Result<Vec<String>> {
        (**self).generate_patterns(url)
    }
}

/// Strips the scheme and normalizes a raw URL. Canonical output is a fixed point.
pub fn canonical_url(raw: &str) -> Result<String> {
    let parsed = parse(raw)?;
    let host = canonical_host(raw, &parsed)?;
    let mut canonical = host;
    canonical.push_str(&canonical_path(parsed.path()));
    if let Some(query) = parsed.query() {
        canonical.push('?');
        canonical.push_str(query);
    }
    Ok(canonical)
}

fn parse(raw: &str) -> Result<Url> {
    let cleaned: String = raw.trim().chars().filter(|c| !matches!(c, '\t' | '\r' | '\n')).collect();
    if cleaned.is_empty() {
        return Err(invalid(raw, "empty URL"));
    }
    let with_scheme = if cleaned.contains("://") { cleaned } else { format!("http://{cleaned}") };
    Url::parse(&with_scheme).map_err(|e| invalid(raw, &e.to_string()))
}

fn canonical_host(raw: &str, url: &Url) -> Result<String> {
    let host = url.host_str().ok_or_else(|| invalid(raw, "missing host"))?;
    let host = host
        .split('.')
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>()
        .join(".");
    if host.is_empty() {
        return Err(invalid(raw, "empty host"));
    }
    Ok(host)
}

/// Collapses runs of slashes; dot segments are already resolved by the parser.
fn canonical_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len().max(1));
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    out
}

fn host_suffixes(host: &str, is_domain: bool) -> Vec<String> {
    let mut hosts = vec![host.to_string()];
    if !is_domain {
        return hosts;
    }

    let labels: Vec<&str> = host.split('.').collect();
    let widest = labels.len().saturating_sub(1).min(MAX_HOST_COMPONENTS);
    hosts.extend(
        (2..=widest)
            .rev()
            .map(|k| labels[labels.len() - k..].join("."))
            .take(MAX_HOST_SUFFIXES),
    );
    hosts
}

fn path_prefixes(path: &str, query: Option<&str>) -> Vec<String> {
    let mut paths = Vec::with_capacity(2 + MAX_PATH_PREFIXES);
    if let Some(query) = query {
        paths.push(format!("{path}?{query}"));
    }
    paths.push(path.to_string());

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let directories = &segments[..segments.len() - 1];

    let mut prefix = String::from("/");
    paths.push(prefix.clone());
    for segment in directories.iter().take(MAX_PATH_PREFIXES - 1) {
        prefix.push_str(segment);
        prefix.push('/');
        paths.push(prefix.clone());
    }

    dedup_preserving_order(paths)
}

fn invalid(url: &str, reason: &str) -> Error {
    Error::InvalidUrl { url: url.to_string(), reason: reason.to_string() }
}

/// Drops repeated entries, keeping each at its first position.
pub fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

/// Entries that occur more than once, listed in the order of their first repeat.
pub fn find_duplicates(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut reported = HashSet::new();
    items
        .iter()
        .filter(|item| !seen.insert(item.as_str()) && reported.insert(item.as_str()))
        .cloned()
        .collect()
}

/// Unique patterns of a URL list, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniquePatterns {
    pub patterns: Vec<String>,
    /// URLs that could not be decomposed.
    pub skipped: usize,
}

/// Decomposes every URL and deduplicates the resulting patterns.
///
/// URLs that fail to decompose are skipped and counted, never fatal.
#[instrument(skip_all)]
pub fn unique_patterns<S, I, U>(source: &S, urls: I) -> UniquePatterns
where
    S: PatternSource + ?Sized,
    I: IntoIterator<Item = U>,
    U: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = UniquePatterns::default();

    for url in urls {
        let url = url.as_ref();
        match source.generate_patterns(url) {
            Ok(patterns) => {
                for pattern in patterns {
                    if seen.insert(pattern.clone()) {
                        out.patterns.push(pattern);
                    }
                }
            }
            Err(e) => {
                debug!(url, error = %e, "skipping URL");
                out.skipped += 1;
            }
        }
    }

    debug!(patterns = out.patterns.len(), skipped = out.skipped, "decomposed URLs");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_canonical_url_strips_scheme_and_fragment() {
        assert_eq!(
            canonical_url("http://User@Example.COM:8080/a/./b/../c?q=1#top").unwrap(),
            "example.com/a/c?q=1"
        );
        assert_eq!(canonical_url("https://www.google.com").unwrap(), "www.google.com/");
        assert_eq!(canonical_url("  evil.com//x///y\r\n").unwrap(), "evil.com/x/y");
    }

    #[test]
    fn test_canonical_url_is_fixed_point() {
        for raw in ["http://a.b.c/1/2.html?param=1", "HTTPS://Foo.Example.COM/x/", "1.2.3.4/z"] {
            let once = canonical_url(raw).unwrap();
            assert_eq!(canonical_url(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_canonical_url_rejects_garbage() {
        assert!(matches!(canonical_url(""), Err(Error::InvalidUrl { .. })));
        assert!(canonical_url("http://").is_err());
        assert!(canonical_url("http://exa mple.com/").is_err());
    }

    #[test]
    fn test_decomposition_with_query() {
        let patterns = UrlDecomposer.generate_patterns("http://a.b.c/1/2.html?param=1").unwrap();
        assert_eq!(
            patterns,
            strings(&[
                "a.b.c/1/2.html?param=1",
                "a.b.c/1/2.html",
                "a.b.c/",
                "a.b.c/1/",
                "b.c/1/2.html?param=1",
                "b.c/1/2.html",
                "b.c/",
                "b.c/1/",
            ])
        );
    }

    #[test]
    fn test_decomposition_limits_hosts_and_paths() {
        let patterns =
            UrlDecomposer.generate_patterns("http://a.b.c.d.e.f.g/1.html").unwrap();
        let hosts: HashSet<&str> = patterns.iter().map(|p| p.split('/').next().unwrap()).collect();
        assert_eq!(
            hosts,
            HashSet::from(["a.b.c.d.e.f.g", "c.d.e.f.g", "d.e.f.g", "e.f.g", "f.g"])
        );

        let patterns = UrlDecomposer.generate_patterns("http://a.b/1/2/3/4/5/6.html").unwrap();
        let paths: Vec<&str> = patterns.iter().map(|p| &p[p.find('/').unwrap()..]).collect();
        assert_eq!(paths, vec!["/1/2/3/4/5/6.html", "/", "/1/", "/1/2/", "/1/2/3/"]);
    }

    #[test]
    fn test_ip_host_is_not_split() {
        let patterns = UrlDecomposer.generate_patterns("http://1.2.3.4/1/").unwrap();
        assert_eq!(patterns, strings(&["1.2.3.4/1/", "1.2.3.4/"]));
    }

    #[test]
    fn test_dedup_preserves_first_seen_order() {
        let items = strings(&["b", "a", "b", "c", "a"]);
        assert_eq!(dedup_preserving_order(items), strings(&["b", "a", "c"]));
    }

    #[test]
    fn test_dedup_is_idempotent_on_unique_input() {
        let items = strings(&["x", "y", "z"]);
        assert_eq!(dedup_preserving_order(items.clone()), items);
    }

    #[test]
    fn test_find_duplicates() {
        let items = strings(&["a", "b", "a", "c", "b", "a"]);
        assert_eq!(find_duplicates(&items), strings(&["a", "b"]));
        assert!(find_duplicates(&strings(&["a", "b"])).is_empty());
    }

    #[test]
    fn test_unique_patterns_skips_bad_urls() {
        let urls = ["http://a.b/", "http://", "a.b/", "http://c.d/x"];
        let unique = unique_patterns(&UrlDecomposer, urls);
        assert_eq!(unique.skipped, 1);
        assert_eq!(unique.patterns, strings(&["a.b/", "c.d/x", "c.d/"]));
    }
}
