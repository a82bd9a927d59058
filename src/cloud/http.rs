// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP implementation of the account REST API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::cloud::{CloudApi, DeviceListing};
use crate::error::{Error, ParseError, ProtocolError};
use crate::region::ResolvedToken;
use crate::telemetry::RawState;
use crate::types::DeviceSerial;

const DEVICE_LIST_PATH: &str = "/api/v2/user-device/device/list";
const DEVICE_STATE_PATH: &str = "/api/user-device/device/state";
const DEVICE_UPDATE_PATH: &str = "/api/user-device/device/update";

// Envelope codes signalling rejected credentials.
const AUTH_CODES: [i64; 2] = [401, 403];

// ============================================================================
// HttpCloudConfig
// ============================================================================

/// Configuration for the REST client.
///
/// # Examples
///
/// ```
/// use dreo_lib::cloud::HttpCloudConfig;
/// use std::time::Duration;
///
/// let config = HttpCloudConfig::new("https://app-api-eu.dreo-tech.com", "token")
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(config.timeout(), Duration::from_secs(5));
/// ```
#[derive(Clone)]
pub struct HttpCloudConfig {
    api_base: String,
    token: String,
    timeout: Duration,
}

impl HttpCloudConfig {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration for the given API base URL and bare token.
    #[must_use]
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Creates a configuration from a resolved token and its region's API.
    #[must_use]
    pub fn from_resolved(resolved: &ResolvedToken) -> Self {
        Self::new(resolved.endpoints().api_base, resolved.token.clone())
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Creates an `HttpCloudClient` from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn into_client(self) -> Result<HttpCloudClient, ProtocolError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ProtocolError::Http)?;

        Ok(HttpCloudClient {
            api_base: self.api_base,
            token: self.token,
            client,
        })
    }
}

impl std::fmt::Debug for HttpCloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCloudConfig")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// HttpCloudClient
// ============================================================================

/// REST client for the account API.
///
/// Every request carries the token as a bearer credential. Responses are
/// wrapped in a `{code, msg, data}` envelope where code `0` means success.
///
/// # Examples
///
/// ```no_run
/// use dreo_lib::cloud::{CloudApi, HttpCloudConfig};
///
/// # async fn example() -> dreo_lib::Result<()> {
/// let client = HttpCloudConfig::new("https://app-api-us.dreo-tech.com", "token").into_client()?;
/// for listing in client.list_devices().await? {
///     println!("{} {}", listing.serial, listing.model);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HttpCloudClient {
    api_base: String,
    token: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

impl HttpCloudClient {
    /// Returns the API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Value, Error> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(ProtocolError::Http)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth(format!("HTTP {}", status.as_u16())));
        }

        if status.is_server_error() {
            return Err(ProtocolError::ConnectionFailed(format!(
                "HTTP {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ))
            .into());
        }

        if !status.is_success() {
            return Err(ProtocolError::Api {
                code: i64::from(status.as_u16()),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            }
            .into());
        }

        let body = response.text().await.map_err(ProtocolError::Http)?;
        tracing::trace!(body = %body, "Received HTTP response");

        let envelope: Envelope = serde_json::from_str(&body).map_err(ParseError::Json)?;
        if AUTH_CODES.contains(&envelope.code) {
            return Err(Error::Auth(envelope.msg));
        }
        if envelope.code != 0 {
            return Err(ProtocolError::Api {
                code: envelope.code,
                message: envelope.msg,
            }
            .into());
        }

        Ok(envelope.data)
    }
}

impl std::fmt::Debug for HttpCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCloudClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl CloudApi for HttpCloudClient {
    async fn list_devices(&self) -> Result<Vec<DeviceListing>, Error> {
        tracing::debug!("Listing account devices");
        let data = self.execute(self.client.get(self.url(DEVICE_LIST_PATH))).await?;
        parse_listings(data)
    }

    async fn fetch_state(&self, serial: &DeviceSerial) -> Result<RawState, Error> {
        tracing::debug!(serial = %serial, "Fetching device state");
        let data = self
            .execute(
                self.client
                    .get(self.url(DEVICE_STATE_PATH))
                    .query(&[("deviceSn", serial.as_str())]),
            )
            .await?;
        parse_state(data)
    }

    async fn send_command(&self, serial: &DeviceSerial, desired: &RawState) -> Result<(), Error> {
        tracing::debug!(serial = %serial, desired = %serde_json::Value::Object(desired.clone()), "Sending command");
        let body = json!({
            "devicesn": serial,
            "desired": desired,
        });
        self.execute(self.client.post(self.url(DEVICE_UPDATE_PATH)).json(&body))
            .await?;
        Ok(())
    }
}

// The listing is either a bare array or wrapped in `{"list": [...]}`.
fn parse_listings(data: Value) -> Result<Vec<DeviceListing>, Error> {
    let entries = match data {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("list") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(ParseError::MissingField("list".to_string()).into()),
        },
        Value::Null => Vec::new(),
        other => {
            return Err(ParseError::UnexpectedFormat(format!(
                "device list is not an array: {other}"
            ))
            .into());
        }
    };

    let mut listings = Vec::with_capacity(entries.len());
    for entry in entries {
        let listing: DeviceListing = serde_json::from_value(entry).map_err(ParseError::Json)?;
        if listing.serial.is_empty() {
            tracing::warn!(model = %listing.model, "Skipping device listing without serial");
            continue;
        }
        listings.push(listing);
    }
    Ok(listings)
}

// State is either a flat field map or `{"mixed": {field: {"state": value}}}`.
fn parse_state(data: Value) -> Result<RawState, Error> {
    let Value::Object(mut map) = data else {
        return Err(ParseError::UnexpectedFormat("device state is not an object".to_string()).into());
    };

    match map.remove("mixed") {
        Some(Value::Object(mixed)) => Ok(mixed
            .into_iter()
            .filter_map(|(field, entry)| match entry {
                Value::Object(mut inner) => inner.remove("state").map(|state| (field, state)),
                _ => None,
            })
            .collect()),
        Some(other) => {
            map.insert("mixed".to_string(), other);
            Ok(map)
        }
        None => Ok(map),
    }
}
