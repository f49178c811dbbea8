// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session state: cookie storage and the configured HTTP transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::{Certificate, Client as HttpClient};
use tracing::{debug, warn};
use url::Url;

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};

/// Session cookies keyed by host.
///
/// Plugged into the HTTP client as its cookie provider, so every response's
/// `Set-Cookie` headers land here and every request carries them back. The
/// map is mutex-guarded: overlapping requests may each trigger a re-login.
#[derive(Debug, Default)]
pub struct CookieJar {
    hosts: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the named cookie stored for `host`.
    pub fn get(&self, host: &str, name: &str) -> Option<String> {
        self.lock().get(host).and_then(|c| c.get(name)).cloned()
    }

    /// True when no cookies are stored for any host.
    pub fn is_empty(&self) -> bool {
        self.lock().values().all(BTreeMap::is_empty)
    }

    /// Forget every stored cookie.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BTreeMap<String, String>>> {
        self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };

        let mut hosts = self.lock();
        let cookies = hosts.entry(host.to_string()).or_default();
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            match parse_set_cookie(raw) {
                Some(SetCookie::Store(name, value)) => {
                    debug!(host, cookie = %name, "storing session cookie");
                    cookies.insert(name, value);
                }
                Some(SetCookie::Expire(name)) => {
                    cookies.remove(&name);
                }
                None => {}
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        let hosts = self.lock();
        let cookies = hosts.get(host)?;
        if cookies.is_empty() {
            return None;
        }
        let joined = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SetCookie {
    Store(String, String),
    Expire(String),
}

fn parse_set_cookie(raw: &str) -> Option<SetCookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    // Max-Age takes precedence over Expires when both are present.
    let mut max_age = None;
    let mut expires = None;
    for attr in parts {
        let Some((key, v)) = attr.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("max-age") {
            max_age = v.trim().parse::<i64>().ok();
        } else if key.eq_ignore_ascii_case("expires") {
            expires = parse_cookie_date(v.trim());
        }
    }
    let expired = match max_age {
        Some(seconds) => seconds <= 0,
        None => expires.is_some_and(|at| at <= Utc::now()),
    };

    if expired {
        Some(SetCookie::Expire(name.to_string()))
    } else {
        Some(SetCookie::Store(name.to_string(), value.trim().to_string()))
    }
}

/// Build the HTTP transport for `base_url`.
///
/// Plain `http` URLs get no TLS setup. `https` URLs trust only the configured
/// CA file, or skip verification when explicitly requested; having neither
/// is a configuration error.
pub(crate) fn build_http_client(
    config: &SdkConfig,
    base_url: &Url,
    cookies: Arc<CookieJar>,
) -> Result<HttpClient> {
    let mut builder = HttpClient::builder()
        .cookie_provider(cookies)
        .timeout(config.request_timeout)
        .user_agent(concat!("orchestra-sdk/", env!("CARGO_PKG_VERSION")));

    if base_url.scheme() == "https" {
        if config.ca_file.is_none() && !config.skip_tls_verify {
            return Err(SdkError::Config(
                "https base url requires a CA file or skip_tls_verify".to_string(),
            ));
        }

        if let Some(path) = &config.ca_file {
            let pem = std::fs::read(path).map_err(|e| {
                SdkError::Config(format!("failed to read CA file {}: {}", path.display(), e))
            })?;
            let certificate = Certificate::from_pem(&pem).map_err(|e| {
                SdkError::Config(format!("invalid CA file {}: {}", path.display(), e))
            })?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(certificate);
        }

        if config.skip_tls_verify {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder
        .build()
        .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Parse an `Expires` date, in either the RFC 1123 form or the older
/// dash-separated `Thu, 01-Jan-1970 00:00:00 GMT` form.
fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw
        .split_whitespace()
        .map(|part| {
            if part.matches('-').count() == 2 {
                part.replace('-', " ")
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    DateTime::parse_from_rfc2822(&normalized)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
