use super::matcher::{matches, normalize_domain, DomainMatcher};
use super::traits::HostMatcher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::warn;
use url::Url;

/// Blur strength in pixels, always within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlurAmount(u8);

impl BlurAmount {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 20;
    pub const DEFAULT: u8 = 5;

    /// Clamps any integer into range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// CSS filter value applied to a suppressed element.
    pub fn css_filter(self) -> String {
        format!("blur({}px)", self.0)
    }
}

impl Default for BlurAmount {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl Serialize for BlurAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case("img") {
            Some(Self::Image)
        } else if tag.eq_ignore_ascii_case("video") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// The shared engine configuration.
///
/// Values are never edited in place: every `with_*` builder returns a fresh
/// copy, and consumers swap the whole value on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    enabled: bool,
    blocked_domains: BTreeSet<String>,
    blur_amount: BlurAmount,
    blur_videos: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked_domains: BTreeSet::new(),
            blur_amount: BlurAmount::default(),
            blur_videos: false,
        }
    }
}

impl Configuration {
    pub fn new<I, S>(enabled: bool, blocked_domains: I, blur_amount: i64, blur_videos: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            enabled,
            blocked_domains: normalize_all(blocked_domains),
            blur_amount: BlurAmount::clamped(blur_amount),
            blur_videos,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn blocked_domains(&self) -> &BTreeSet<String> {
        &self.blocked_domains
    }

    pub fn blur_amount(&self) -> BlurAmount {
        self.blur_amount
    }

    pub fn blur_videos(&self) -> bool {
        self.blur_videos
    }

    pub fn matcher(&self) -> DomainMatcher {
        DomainMatcher::new(&self.blocked_domains)
    }

    /// True when pages on `hostname` get suppression at all.
    pub fn applies_to_host(&self, hostname: &str) -> bool {
        self.enabled && matches(hostname, &self.blocked_domains)
    }

    /// Same verdict as [`Configuration::applies_to_host`], using a matcher
    /// the caller built once from this Configuration.
    pub fn applies_with(&self, matcher: &impl HostMatcher, hostname: &str) -> bool {
        self.enabled && matcher.matches_host(hostname)
    }

    /// Suppression verdict for one element on a page whose domain match is
    /// already known.
    pub fn suppresses(&self, page_matched: bool, kind: MediaKind) -> bool {
        self.enabled && page_matched && (kind == MediaKind::Image || self.blur_videos)
    }

    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    pub fn with_blur_amount(&self, amount: i64) -> Self {
        Self {
            blur_amount: BlurAmount::clamped(amount),
            ..self.clone()
        }
    }

    pub fn with_blur_videos(&self, blur_videos: bool) -> Self {
        Self {
            blur_videos,
            ..self.clone()
        }
    }

    /// Adds a user-entered URL or host. Unparseable or duplicate entries
    /// leave the set unchanged.
    pub fn with_domain_added(&self, entry: &str) -> Self {
        let mut next = self.clone();
        if let Some(domain) = parse_domain_entry(entry) {
            next.blocked_domains.insert(domain);
        }
        next
    }

    pub fn with_domain_removed(&self, domain: &str) -> Self {
        let mut next = self.clone();
        next.blocked_domains.remove(&normalize_domain(domain));
        next
    }

    /// Copy with every blocked domain in stored form.
    pub fn normalized(&self) -> Self {
        Self {
            blocked_domains: normalize_all(&self.blocked_domains),
            ..self.clone()
        }
    }

    /// Lenient decoding: each missing or mistyped field falls back to its
    /// default instead of rejecting the whole object.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let Some(fields) = value.as_object() else {
            warn!("Configuration payload is not an object, using defaults");
            return defaults;
        };

        let enabled = fields
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.enabled);

        let blocked_domains = fields
            .get("blockedDomains")
            .or_else(|| fields.get("blockedWebsites"))
            .and_then(Value::as_array)
            .map(|items| normalize_all(items.iter().filter_map(Value::as_str)))
            .unwrap_or_default();

        let blur_amount = fields
            .get("blurAmount")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
            .map(BlurAmount::clamped)
            .unwrap_or(defaults.blur_amount);

        let blur_videos = fields
            .get("blurVideos")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.blur_videos);

        Self {
            enabled,
            blocked_domains,
            blur_amount,
            blur_videos,
        }
    }
}

impl<'de> Deserialize<'de> for Configuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Turns a URL or bare host typed by the user into stored domain form.
pub fn parse_domain_entry(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let host = match Url::parse(input) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_string(),
            None => input.to_string(),
        },
        Err(_) => input.to_string(),
    };

    let domain = normalize_domain(&host);
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

fn normalize_all<I, S>(domains: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    domains
        .into_iter()
        .map(|d| normalize_domain(d.as_ref()))
        .filter(|d| !d.is_empty())
        .collect()
}
