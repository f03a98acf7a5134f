// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no internet connection; check your network and try again")]
    Offline,

    #[error("{operation} timed out after {}s; check your connection and try again", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("server error ({status}){}; please try again later", detail(.message))]
    Server {
        status: u16,
        message: Option<String>,
        attempts: u32,
    },

    #[error("request rejected ({status}){}", detail(.message))]
    Client { status: u16, message: Option<String> },

    #[error("cannot reach backend after {attempts} attempt(s): {message}")]
    Transport { message: String, attempts: u32 },

    #[error("decode {what}: {message}")]
    Decode { what: &'static str, message: String },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("backend reported failure: {0}")]
    Rejected(String),

    #[error("invalid backend URL {url:?}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("read upload file {path}: {message}")]
    File { path: String, message: String },
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

impl ApiError {
    pub(crate) fn decode(what: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Decode {
            what,
            message: error.to_string(),
        }
    }

    /// Error for a non-2xx response that will not be retried further.
    pub(crate) fn from_status(status: StatusCode, body: &str, attempts: u32) -> Self {
        let message = server_message(body);
        if status.is_server_error() {
            Self::Server {
                status: status.as_u16(),
                message,
                attempts,
            }
        } else {
            Self::Client {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Upload failures prefer the JSON `error` field and otherwise map the
    /// statuses operators hit most to friendlier text.
    pub(crate) fn from_upload_status(status: StatusCode, body: &str, attempts: u32) -> Self {
        let message = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => envelope.message(),
            Err(_) => match status {
                StatusCode::PAYLOAD_TOO_LARGE => {
                    Some("file too large; select a smaller file".to_owned())
                }
                StatusCode::BAD_REQUEST => {
                    Some("invalid file format; check the spreadsheet structure".to_owned())
                }
                _ => None,
            },
        };
        let message = message.or_else(|| Some(format!("upload failed ({})", status.as_u16())));
        if status.is_server_error() {
            Self::Server {
                status: status.as_u16(),
                message,
                attempts,
            }
        } else {
            Self::Client {
                status: status.as_u16(),
                message,
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

impl ErrorEnvelope {
    fn message(self) -> Option<String> {
        let detail = self.detail.and_then(|detail| match detail {
            serde_json::Value::String(text) => Some(text),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });
        self.error
            .or(detail)
            .or(self.message)
            .filter(|message| !message.trim().is_empty())
    }
}

pub(crate) fn server_message(body: &str) -> Option<String> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.message();
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() < 100 && !trimmed.contains('{') && !trimmed.contains('<')
    {
        return Some(trimmed.to_owned());
    }
    None
}
