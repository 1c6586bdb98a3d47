use super::traits::HostMatcher;
use rustc_hash::FxHashSet;

/// Lower-cases a host and strips one leading `www.` label.
pub fn normalize_domain(domain: &str) -> String {
    let lowered = domain.trim().to_lowercase();
    match lowered.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

/// Suffix match of `hostname` against a blocklist.
///
/// Both sides are normalized. A candidate matches when it equals the host or
/// is a parent domain of it (`foo.example.com` matches `example.com`, while
/// `notexample.com` does not). Candidates are literal, no wildcard syntax.
pub fn matches<I, S>(hostname: &str, blocked: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let host = normalize_domain(hostname);
    if host.is_empty() {
        return false;
    }

    blocked.into_iter().any(|candidate| {
        let candidate = normalize_domain(candidate.as_ref());
        if candidate.is_empty() {
            return false;
        }
        host == candidate
            || (host.len() > candidate.len()
                && host.ends_with(candidate.as_str())
                && host.as_bytes()[host.len() - candidate.len() - 1] == b'.')
    })
}

/// Set-backed matcher built once per Configuration.
///
/// Entries are normalized on construction so lookups only normalize the
/// observed host side.
#[derive(Debug, Default, Clone)]
pub struct DomainMatcher {
    domains: FxHashSet<Box<str>>,
}

impl DomainMatcher {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| normalize_domain(d.as_ref()))
            .filter(|d| !d.is_empty())
            .map(String::into_boxed_str)
            .collect();
        Self { domains }
    }
}

impl HostMatcher for DomainMatcher {
    fn matches_host(&self, hostname: &str) -> bool {
        let host = normalize_domain(hostname);

        // Iterative suffix walk, one label at a time
        let mut part = host.as_str();
        while !part.is_empty() {
            if self.domains.contains(part) {
                return true;
            }
            match part.find('.') {
                Some(idx) => part = &part[idx + 1..],
                None => break,
            }
        }

        false
    }
}
