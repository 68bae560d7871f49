//! Request envelopes and wire documents for the device management API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

pub const REGISTER_PATH: &str = "/api/devices/register";
pub const API_KEY_HEADER: &str = "X-API-Key";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

/// Transport-neutral HTTP request. `path` is relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            body: None,
        }
    }

    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> serde_json::Result<Self> {
        Self::with_json(Method::Post, path.into(), body)
    }

    pub fn put_json<T: Serialize>(path: impl Into<String>, body: &T) -> serde_json::Result<Self> {
        Self::with_json(Method::Put, path.into(), body)
    }

    fn with_json<T: Serialize>(method: Method, path: String, body: &T) -> serde_json::Result<Self> {
        Ok(Self {
            method,
            path,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: Some(serde_json::to_string(body)?),
        })
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP round trip bounded by the implementation's timeout.
pub trait HttpTransport {
    fn send(&mut self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Largest response body a transport will buffer.
pub const MAX_RESPONSE_BODY: usize = 32 * 1024;

/// Drains a chunked reader into a string. A body larger than
/// [`MAX_RESPONSE_BODY`] is an error, never a truncated document.
pub fn read_body<E: core::fmt::Debug>(
    mut read: impl FnMut(&mut [u8]) -> Result<usize, E>,
) -> Result<String, TransportError> {
    let mut body = Vec::new();
    let mut chunk = [0_u8; 512];
    loop {
        let count = read(&mut chunk).map_err(|err| TransportError::Io(format!("{err:?}")))?;
        if count == 0 {
            break;
        }
        if body.len() + count > MAX_RESPONSE_BODY {
            return Err(TransportError::Io(format!(
                "response body exceeds {MAX_RESPONSE_BODY} bytes"
            )));
        }
        body.extend_from_slice(&chunk[..count]);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

pub fn heartbeat_path(device_id: u64) -> String {
    format!("/api/devices/{device_id}/heartbeat")
}

pub fn temperature_path(device_id: u64) -> String {
    format!("/api/devices/{device_id}/temperature")
}

pub fn relay_state_path(device_id: u64) -> String {
    format!("/api/devices/{device_id}/relay-state")
}

pub fn pending_commands_path(device_id: u64) -> String {
    format!("/api/devices/{device_id}/commands/pending")
}

pub fn command_path(device_id: u64, command_id: u64) -> String {
    format!("/api/devices/{device_id}/commands/{command_id}")
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub hostname: &'a str,
    pub mac_address: &'a str,
    pub ip_address: &'a str,
    pub firmware_version: &'a str,
}

/// Both fields are optional on the wire so a partial answer can be reported
/// instead of failing to parse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub device_id: Option<u64>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatRequest<'a> {
    pub ip_address: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemperatureReport {
    pub temperature: f32,
    pub sensor_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayStateReport {
    /// 1-based.
    pub relay_number: u8,
    pub state: bool,
    pub mode: &'static str,
    pub temp_on: f32,
    pub temp_off: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PendingCommandsResponse {
    pub commands: Vec<RawCommand>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommand {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Acknowledged,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandStatusUpdate {
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
}
