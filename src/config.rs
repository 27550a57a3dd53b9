//! Shared settings and configuration resolution.
//!
//! Every tunable resolves through the same three tiers, highest first:
//!
//! 1. the explicit argument handed to the service,
//! 2. the shared [`Settings`] value passed into the constructor,
//! 3. a built-in default.
//!
//! Resolution happens once, at service construction; nothing re-reads
//! settings at request time. `Settings` is always an explicit parameter —
//! there is no process-global configuration.

use std::path::{Path, PathBuf};

use http::Uri;
use serde::Deserialize;
use tracing::{trace, warn};

use crate::error::Error;

pub(crate) const DEFAULT_DESTINATION: &str = "http://127.0.0.1/";
pub(crate) const DEFAULT_PREFIX: &str = "/1.0/*";
pub(crate) const DEFAULT_INDEX: &str = "index.html";
pub(crate) const DEFAULT_PATTERN: &str = "/*";
pub(crate) const DEFAULT_STRIP: &str = "/";

// ── Settings ──────────────────────────────────────────────────────────────────

/// Deployment-wide settings shared by every service built from them.
///
/// Both sections are optional, as is every field — an empty `Settings` is
/// valid and leaves all decisions to explicit options and built-in defaults.
///
/// ```toml
/// [proxy]
/// destination_url = "http://10.0.0.5:8080/"
/// request_prefixes = ["/1.0/*", "/2.0/*"]
/// log_level = 1
///
/// [static]
/// root = "/srv/www"
/// magic_hosts = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(rename = "static", default)]
    pub static_files: StaticSettings,
}

/// The `[proxy]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxySettings {
    pub destination_url: Option<String>,
    pub request_prefixes: Option<Vec<String>>,
    pub log_level: Option<u8>,
}

/// The `[static]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticSettings {
    pub root: Option<PathBuf>,
    pub index_file: Option<String>,
    pub pattern: Option<String>,
    pub strip_prefix: Option<String>,
    pub magic_hosts: Option<bool>,
    pub log_level: Option<u8>,
}

impl Settings {
    /// Parses settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::InvalidSettings(e.to_string()))
    }

    /// Reads and parses a TOML settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// A destination is usable when it parses as an absolute `http`/`https` URL
/// with a host. Anything else — a bare host, a path, garbage — is passed
/// over for the next tier.
pub(crate) fn valid_destination(candidate: &str) -> bool {
    match candidate.parse::<Uri>() {
        Ok(uri) => {
            matches!(uri.scheme_str(), Some("http" | "https")) && uri.authority().is_some()
        }
        Err(_) => false,
    }
}

/// First syntactically valid destination wins; each rejected tier leaves a
/// trace. The built-in default is always valid, so this cannot fail.
pub(crate) fn resolve_destination(explicit: Option<&str>, settings: Option<&str>) -> String {
    for (tier, candidate) in [("explicit", explicit), ("settings", settings)] {
        match candidate {
            Some(url) if valid_destination(url) => return url.to_owned(),
            Some(url) => trace!(tier, url, "destination candidate rejected"),
            None => {}
        }
    }
    DEFAULT_DESTINATION.to_owned()
}

/// An explicit level always wins, *including an explicit 0* — "silence this
/// instance" must be expressible even when settings say otherwise.
pub(crate) fn resolve_log_level(explicit: Option<u8>, settings: Option<u8>) -> u8 {
    explicit.or(settings).unwrap_or(0)
}

/// Resolves prefix patterns through the tiers. An explicitly-given empty
/// list does not win — it falls through, so a service always ends up with
/// at least one pattern.
pub(crate) fn resolve_prefixes(
    explicit: Option<Vec<String>>,
    settings: Option<&[String]>,
) -> Vec<String> {
    if let Some(list) = explicit {
        if !list.is_empty() {
            return list;
        }
        warn!("explicit prefix list is empty, falling through");
    }
    if let Some(list) = settings {
        if !list.is_empty() {
            return list.to_vec();
        }
        trace!("settings prefix list is empty, falling through");
    }
    vec![DEFAULT_PREFIX.to_owned()]
}
