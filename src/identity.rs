// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of nsq-tracing.
//
// nsq-tracing is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// nsq-tracing is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with nsq-tracing.  If
// not, see <http://www.gnu.org/licenses/>.

//! Per-process identity
//!
//! [`IdentityTags`] are computed once, when the logger is initialized, and copied into every
//! envelope thereafter: the host's address, the application name & whatever extra tags the
//! application supplied.

use crate::{
    error::{Error, Result},
    LOCAL_TARGET,
};

use backtrace::Backtrace;

use std::collections::BTreeMap;

type StdResult<T, E> = std::result::Result<T, E>;

/// Used when neither an IP address nor a hostname can be found.
pub const LOOPBACK_HOSTNAME: &str = "127.0.0.1";

/// Keys set on each envelope individually; extra tags may not use them.
pub const RESERVED_KEYS: [&str; 4] = ["uuid", "msg", "timestamp", "severity"];

/// A non-empty application name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppName(String);

impl AppName {
    pub fn new(name: String) -> Result<AppName> {
        if name.is_empty() {
            Err(Error::NoApplicationName)
        } else {
            Ok(AppName(name))
        }
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AppName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl std::convert::TryFrom<String> for AppName {
    type Error = Error;
    fn try_from(x: String) -> StdResult<Self, Self::Error> {
        AppName::new(x)
    }
}

impl std::convert::TryFrom<&str> for AppName {
    type Error = Error;
    fn try_from(x: &str) -> StdResult<Self, Self::Error> {
        AppName::new(x.to_string())
    }
}

/// Attempt to figure-out how this host should be identified to the log collector.
///
/// The order of preference is:
///
/// 1. a non-loopback IPv4 address of this host
/// 2. the hostname
///
/// Fails only if both are unavailable; see [`hostname_or_loopback`] for the infallible version.
pub fn discover_hostname() -> Result<String> {
    local_ip_address::local_ip() // :=> StdResult<IpAddr, local_ip_address::Error>
        .map_err(|err| Error::NoHostname {
            source: Box::new(err),
            back: Backtrace::new(),
        })
        .and_then(|ip| {
            if ip.is_loopback() || ip.is_unspecified() {
                Err(Error::NoHostname {
                    source: format!("{} is not a routable address", ip).into(),
                    back: Backtrace::new(),
                })
            } else {
                Ok(ip.to_string())
            }
        })
        // vvv fall back to gethostname() :=> StdResult<String, Error>
        .or_else(|_err| {
            hostname::get()
                .map_err(|err| Error::NoHostname {
                    source: Box::new(err),
                    back: Backtrace::new(),
                })
                .and_then(|hn| {
                    let hn = hn.to_string_lossy().into_owned();
                    if hn.is_empty() {
                        Err(Error::NoHostname {
                            source: "empty hostname".into(),
                            back: Backtrace::new(),
                        })
                    } else {
                        Ok(hn)
                    }
                })
        })
}

/// Like [`discover_hostname`], but falls back to [`LOOPBACK_HOSTNAME`] (with a warning) rather
/// than stopping the application.
pub fn hostname_or_loopback() -> String {
    discover_hostname().unwrap_or_else(|err| {
        tracing::warn!(
            target: LOCAL_TARGET,
            "{}; using {} to avoid stopping the application here",
            err,
            LOOPBACK_HOSTNAME
        );
        LOOPBACK_HOSTNAME.to_string()
    })
}

/// The fixed tags attached to every envelope.
///
/// Extra tags are merged last, so they may override "hostname" & "application"; tags named like
/// one of the [`RESERVED_KEYS`] are discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityTags {
    tags: BTreeMap<String, String>,
}

impl IdentityTags {
    pub fn new<I, K, V>(hostname: String, application: &AppName, extra: I) -> IdentityTags
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut tags = BTreeMap::new();
        tags.insert("hostname".to_string(), hostname);
        tags.insert("application".to_string(), application.to_string());
        for (k, v) in extra {
            let k: String = k.into();
            if RESERVED_KEYS.contains(&k.as_str()) {
                tracing::warn!(
                    target: LOCAL_TARGET,
                    "Extra tag {:?} collides with a per-message field and will be ignored",
                    k
                );
                continue;
            }
            tags.insert(k, v.into());
        }
        IdentityTags { tags }
    }
    pub fn hostname(&self) -> &str {
        self.get("hostname").unwrap_or(LOOPBACK_HOSTNAME)
    }
    pub fn application(&self) -> &str {
        self.get("application").unwrap_or_default()
    }
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.tags.iter()
    }
    pub(crate) fn to_map(&self) -> BTreeMap<String, String> {
        self.tags.clone()
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn app_name() {
        assert!(AppName::new(String::new()).is_err());
        assert!(AppName::new("   ".to_string()).is_ok());
        assert!(matches!(
            AppName::try_from(""),
            Err(Error::NoApplicationName)
        ));
        assert_eq!(AppName::try_from("billing").unwrap().as_str(), "billing");
    }

    #[test]
    fn hostname() {
        // Whatever the host looks like, we must come back with *something*.
        assert!(!hostname_or_loopback().is_empty());
    }

    #[test]
    fn identity_tags() {
        let app = AppName::try_from("billing").unwrap();
        let tags = IdentityTags::new(
            "10.0.0.7".to_string(),
            &app,
            vec![("region", "us"), ("uuid", "nope"), ("severity", "nope")],
        );
        assert_eq!(tags.hostname(), "10.0.0.7");
        assert_eq!(tags.application(), "billing");
        assert_eq!(tags.get("region"), Some("us"));
        assert_eq!(tags.get("uuid"), None);
        assert_eq!(tags.get("severity"), None);
        assert_eq!(tags.iter().count(), 3);

        let tags = IdentityTags::new(
            "10.0.0.7".to_string(),
            &app,
            vec![("hostname".to_string(), "web-1".to_string())],
        );
        assert_eq!(tags.hostname(), "web-1");
    }
}
