// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Region resolution from account tokens.
//!
//! An account token may carry a region hint as a `:EU` or `:NA` suffix.
//! [`resolve_token`] strips the hint and maps it to the regional REST and
//! push endpoints. This is a pure function with no network access.
//!
//! # Examples
//!
//! ```
//! use dreo_lib::region::{Region, resolve_token};
//!
//! let resolved = resolve_token("abc123:EU").unwrap();
//! assert_eq!(resolved.region, Region::Eu);
//! assert_eq!(resolved.token, "abc123");
//!
//! assert_eq!(resolve_token("abc123").unwrap().region, Region::Na);
//! assert!(resolve_token("abc123:XX").is_err());
//! ```

use std::fmt;

use crate::error::Error;

/// Cloud region of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Region {
    /// North America, the default when the token carries no hint.
    #[default]
    Na,
    /// Europe.
    Eu,
}

impl Region {
    /// Returns the default endpoints of the region.
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        match self {
            Self::Na => Endpoints::new(
                "https://app-api-us.dreo-tech.com",
                "wss://wsb-us.dreo-tech.com/websocket",
            ),
            Self::Eu => Endpoints::new(
                "https://app-api-eu.dreo-tech.com",
                "wss://wsb-eu.dreo-tech.com/websocket",
            ),
        }
    }

    /// Returns the token suffix naming the region.
    #[must_use]
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Na => "NA",
            Self::Eu => "EU",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// REST and push endpoint pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Base URL of the REST API, without trailing slash.
    pub api_base: String,
    /// URL of the push channel.
    pub push_url: String,
}

impl Endpoints {
    /// Creates an endpoint pair.
    #[must_use]
    pub fn new(api_base: impl Into<String>, push_url: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            push_url: push_url.into(),
        }
    }
}

/// A token split into its bare credential and region.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    /// The resolved region.
    pub region: Region,
    /// The token with the region suffix removed.
    pub token: String,
}

impl ResolvedToken {
    /// Returns the default endpoints of the resolved region.
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        self.region.endpoints()
    }
}

impl fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("region", &self.region)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Resolves the region of an account token.
///
/// The suffix is whatever follows the last `:`. It must be `EU` or `NA`,
/// compared without regard to ASCII case. A token with no `:` resolves to
/// [`Region::Na`].
///
/// # Errors
///
/// Returns [`Error::InvalidTokenFormat`] if the token is empty, if the
/// suffix is empty or unknown, or if nothing precedes the suffix.
pub fn resolve_token(raw: &str) -> Result<ResolvedToken, Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::InvalidTokenFormat("token is empty".to_string()));
    }

    let Some((token, suffix)) = raw.rsplit_once(':') else {
        return Ok(ResolvedToken {
            region: Region::Na,
            token: raw.to_string(),
        });
    };

    let region = if suffix.eq_ignore_ascii_case("EU") {
        Region::Eu
    } else if suffix.eq_ignore_ascii_case("NA") {
        Region::Na
    } else if suffix.is_empty() {
        return Err(Error::InvalidTokenFormat(
            "region suffix is empty".to_string(),
        ));
    } else {
        return Err(Error::InvalidTokenFormat(format!(
            "unknown region suffix {suffix:?}"
        )));
    };

    if token.is_empty() {
        return Err(Error::InvalidTokenFormat(
            "token is empty before region suffix".to_string(),
        ));
    }

    Ok(ResolvedToken {
        region,
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eu_suffix_resolves_to_eu() {
        let resolved = resolve_token("abc123:EU").unwrap();
        assert_eq!(resolved.region, Region::Eu);
        assert_eq!(resolved.token, "abc123");
        assert_eq!(
            resolved.endpoints().api_base,
            "https://app-api-eu.dreo-tech.com"
        );
    }

    #[test]
    fn na_suffix_and_no_suffix_resolve_to_na() {
        for raw in ["abc123:NA", "abc123"] {
            let resolved = resolve_token(raw).unwrap();
            assert_eq!(resolved.region, Region::Na);
            assert_eq!(resolved.token, "abc123");
            assert_eq!(
                resolved.endpoints().push_url,
                "wss://wsb-us.dreo-tech.com/websocket"
            );
        }
    }

    #[test]
    fn unknown_suffix_is_rejected() {
        assert!(matches!(
            resolve_token("abc123:XX"),
            Err(Error::InvalidTokenFormat(_))
        ));
    }

    #[test]
    fn suffix_ignores_case() {
        assert_eq!(resolve_token("abc:eu").unwrap().region, Region::Eu);
        assert_eq!(resolve_token("abc:Na").unwrap().region, Region::Na);
    }

    #[test]
    fn empty_suffix_is_malformed_not_absent() {
        assert!(matches!(
            resolve_token("abc123:"),
            Err(Error::InvalidTokenFormat(_))
        ));
    }

    #[test]
    fn empty_tokens_are_rejected() {
        for raw in ["", "   ", ":EU"] {
            assert!(
                matches!(resolve_token(raw), Err(Error::InvalidTokenFormat(_))),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn only_last_colon_separates_suffix() {
        let resolved = resolve_token("part:one:EU").unwrap();
        assert_eq!(resolved.token, "part:one");
        assert!(resolve_token("part:one").is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let resolved = resolve_token("secret:EU").unwrap();
        let debug = format!("{resolved:?}");
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn endpoints_trim_trailing_slash() {
        let endpoints = Endpoints::new("http://127.0.0.1:8080/", "ws://127.0.0.1:8081");
        assert_eq!(endpoints.api_base, "http://127.0.0.1:8080");
    }
}
