// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use chatdesk_app::{Candidate, ChatMessage, ReportStats, UploadSummary};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::{AlwaysOnline, ApiError, Connectivity, RetryPolicy};

/// Tunnels in front of the backend serve an interstitial page without it.
pub const TUNNEL_WARNING_HEADER: &str = "ngrok-skip-browser-warning";
pub const DEFAULT_CANDIDATES_PATH: &str = "/get_all_candidates/";
pub const DEFAULT_REPORT_STATS_PATH: &str = "/report_stats/";

const ALL_CHATS_PATH: &str = "/get_all_chats/";
const ESCALATED_PATH: &str = "/get_escalated/";
const CHAT_HISTORY_PATH: &str = "/get_chat_history/";
const ADMIN_REPLY_PATH: &str = "/send_admin_reply/";
const RESUME_BOT_PATH: &str = "/resume_bot/";
const UPLOAD_PATH: &str = "/upload_excel/";

/// Receives whole percentages of the upload body sent so far.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub upload_timeout: Duration,
    pub retry: RetryPolicy,
    pub upload_retry: RetryPolicy,
    pub candidates_path: String,
    pub report_stats_path: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            upload_retry: RetryPolicy::none(),
            candidates_path: DEFAULT_CANDIDATES_PATH.to_owned(),
            report_stats_path: DEFAULT_REPORT_STATS_PATH.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: Option<Value>,
    /// Merged over the default headers; later entries win.
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn json(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct Client {
    base_url: String,
    options: ClientOptions,
    connectivity: Arc<dyn Connectivity>,
    http: HttpClient,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct Call<'a> {
    endpoint: &'a str,
    operation: &'static str,
    policy: &'a RetryPolicy,
    timeout: Duration,
    map_status: fn(StatusCode, &str, u32) -> ApiError,
}

impl Client {
    pub fn new(
        base_url: &str,
        options: ClientOptions,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        let invalid = |message: String| ApiError::InvalidBaseUrl {
            url: base_url.clone(),
            message,
        };
        if base_url.is_empty() {
            return Err(invalid("must not be empty".to_owned()));
        }
        let parsed = Url::parse(&base_url).map_err(|error| invalid(error.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", parsed.scheme())));
        }

        let http = HttpClient::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|error| ApiError::InvalidRequest(format!("build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            options,
            connectivity,
            http,
        })
    }

    /// Client with default options that never reports offline.
    pub fn with_defaults(base_url: &str) -> Result<Self, ApiError> {
        Self::new(base_url, ClientOptions::default(), Arc::new(AlwaysOnline))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Generic JSON request through the retrying executor.
    pub fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        let url = self.endpoint_url(path, &options.query)?;
        let headers = default_headers(true, &options.headers)?;
        let call = Call {
            endpoint: path,
            operation: "request",
            policy: &self.options.retry,
            timeout: self.options.timeout,
            map_status: ApiError::from_status,
        };
        let response = self.execute(&call, || {
            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(body) = &options.body {
                builder = builder.json(body);
            }
            Ok(builder)
        })?;
        decode_json(response, path, &call)
    }

    pub fn list_all_chats(&self) -> Result<Vec<Candidate>, ApiError> {
        self.request(Method::GET, ALL_CHATS_PATH, &RequestOptions::default())
    }

    pub fn list_escalated(&self) -> Result<Vec<Candidate>, ApiError> {
        self.request(Method::GET, ESCALATED_PATH, &RequestOptions::default())
    }

    pub fn list_candidates(&self) -> Result<Vec<Candidate>, ApiError> {
        self.request(
            Method::GET,
            &self.options.candidates_path,
            &RequestOptions::default(),
        )
    }

    pub fn chat_history(&self, phone_number: &str) -> Result<Vec<ChatMessage>, ApiError> {
        if phone_number.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "phone number must not be empty".to_owned(),
            ));
        }
        let options = RequestOptions {
            query: vec![("phone".to_owned(), phone_number.to_owned())],
            ..RequestOptions::default()
        };
        let payload: HistoryPayload = self.request(Method::GET, CHAT_HISTORY_PATH, &options)?;
        Ok(payload.into_messages())
    }

    pub fn send_admin_reply(&self, phone_number: &str, text: &str) -> Result<Value, ApiError> {
        if phone_number.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "select a candidate before replying".to_owned(),
            ));
        }
        if text.trim().is_empty() {
            return Err(ApiError::InvalidRequest("enter a message to send".to_owned()));
        }
        let body = json!({ "phone_number": phone_number, "text": text });
        let value: Value =
            self.request(Method::POST, ADMIN_REPLY_PATH, &RequestOptions::json(body))?;
        ensure_accepted(value, "reply was not accepted")
    }

    pub fn resume_bot(&self, phone_number: &str) -> Result<Value, ApiError> {
        if phone_number.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "select a candidate before resuming the bot".to_owned(),
            ));
        }
        let body = json!({ "phone_number": phone_number });
        let value: Value =
            self.request(Method::POST, RESUME_BOT_PATH, &RequestOptions::json(body))?;
        ensure_accepted(value, "bot resume was not accepted")
    }

    pub fn report_stats(&self) -> Result<ReportStats, ApiError> {
        self.request(
            Method::GET,
            &self.options.report_stats_path,
            &RequestOptions::default(),
        )
    }

    pub fn upload_file(
        &self,
        path: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<UploadSummary, ApiError> {
        let bytes = fs::read(path).map_err(|error| ApiError::File {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "roster".to_owned());
        self.upload_bytes(&file_name, bytes, progress)
    }

    /// Sends a roster as the multipart `file` field. The HTTP library sets
    /// the multipart content type, so no JSON content type is attached.
    pub fn upload_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        progress: Option<ProgressFn>,
    ) -> Result<UploadSummary, ApiError> {
        let url = self.endpoint_url(UPLOAD_PATH, &[])?;
        let headers = default_headers(false, &[])?;
        let bytes: Arc<[u8]> = bytes.into();
        let length = bytes.len() as u64;
        let mime = mime_for(file_name);
        let call = Call {
            endpoint: UPLOAD_PATH,
            operation: "upload",
            policy: &self.options.upload_retry,
            timeout: self.options.upload_timeout,
            map_status: ApiError::from_upload_status,
        };

        let response = self.execute(&call, || {
            let reader = ProgressReader::new(Arc::clone(&bytes), progress.clone());
            let part = Part::reader_with_length(reader, length)
                .file_name(file_name.to_owned())
                .mime_str(mime)
                .map_err(|error| ApiError::InvalidRequest(format!("build upload: {error}")))?;
            Ok(self
                .http
                .post(url.clone())
                .headers(headers.clone())
                .multipart(Form::new().part("file", part)))
        })?;

        let value: Value = decode_json(response, UPLOAD_PATH, &call)?;
        let value = ensure_accepted(value, "upload was not accepted")?;
        let summary: UploadSummary =
            serde_json::from_value(value).map_err(|error| ApiError::decode("upload response", error))?;
        debug!(
            added = summary.added,
            skipped = summary.skipped,
            failed = summary.failed_entries().len(),
            "upload finished"
        );
        Ok(summary)
    }

    fn endpoint_url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
        let joined = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        let mut url = Url::parse(&joined).map_err(|error| ApiError::InvalidBaseUrl {
            url: joined.clone(),
            message: error.to_string(),
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Sends until success, a non-retryable outcome, or the policy's budget
    /// runs out. Connectivity is checked before every attempt.
    fn execute<F>(&self, call: &Call<'_>, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> Result<RequestBuilder, ApiError>,
    {
        let mut attempt: u32 = 0;
        loop {
            if !self.connectivity.is_online() {
                debug!(endpoint = call.endpoint, "offline, request not sent");
                return Err(ApiError::Offline);
            }
            debug!(endpoint = call.endpoint, attempt = attempt + 1, "sending request");

            match build()?.timeout(call.timeout).send() {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if call.policy.should_retry_status(status, attempt) {
                        self.back_off(call, attempt, &format!("status {status}"));
                        attempt += 1;
                        continue;
                    }
                    let body = response.text().unwrap_or_default();
                    return Err((call.map_status)(status, &body, attempt + 1));
                }
                Err(error) if error.is_timeout() => {
                    warn!(endpoint = call.endpoint, "request timed out");
                    return Err(ApiError::Timeout {
                        operation: call.operation,
                        after: call.timeout,
                    });
                }
                Err(error) => {
                    if call.policy.should_retry_transport(attempt) {
                        self.back_off(call, attempt, &error.to_string());
                        attempt += 1;
                        continue;
                    }
                    return Err(ApiError::Transport {
                        message: error.to_string(),
                        attempts: attempt + 1,
                    });
                }
            }
        }
    }

    fn back_off(&self, call: &Call<'_>, attempt: u32, reason: &str) {
        let delay = call.policy.next_delay(attempt);
        warn!(
            endpoint = call.endpoint,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            reason,
            "retrying request"
        );
        thread::sleep(delay);
    }
}

fn default_headers(json: bool, extra: &[(String, String)]) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    if json {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    headers.insert(
        HeaderName::from_static(TUNNEL_WARNING_HEADER),
        HeaderValue::from_static("true"),
    );
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|error| ApiError::InvalidRequest(format!("header {name:?}: {error}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|error| ApiError::InvalidRequest(format!("header {name}: {error}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn decode_json<T: DeserializeOwned>(
    response: Response,
    endpoint: &str,
    call: &Call<'_>,
) -> Result<T, ApiError> {
    let body = response.text().map_err(|error| {
        if error.is_timeout() {
            ApiError::Timeout {
                operation: call.operation,
                after: call.timeout,
            }
        } else {
            ApiError::Transport {
                message: error.to_string(),
                attempts: 1,
            }
        }
    })?;
    serde_json::from_str(&body).map_err(|error| {
        debug!(endpoint, %error, "response body did not decode");
        ApiError::decode("response body", error)
    })
}

/// Turns `{"success": false, ...}` into an error. Bodies without a
/// `success` field pass through.
fn ensure_accepted(value: Value, fallback: &str) -> Result<Value, ApiError> {
    if value.get("success") != Some(&Value::Bool(false)) {
        return Ok(value);
    }
    let message = ["error", "message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|message| !message.trim().is_empty())
        .unwrap_or(fallback);
    Err(ApiError::Rejected(message.to_owned()))
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryPayload {
    Bare(Vec<ChatMessage>),
    Wrapped {
        #[serde(default)]
        history: Option<Vec<ChatMessage>>,
    },
}

impl HistoryPayload {
    fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            Self::Bare(messages) => messages,
            Self::Wrapped { history } => history.unwrap_or_default(),
        }
    }
}

/// Upload body reader that reports percent sent as the HTTP library pulls
/// bytes from it.
struct ProgressReader {
    bytes: Arc<[u8]>,
    position: usize,
    last_percent: Option<u8>,
    progress: Option<ProgressFn>,
}

impl ProgressReader {
    fn new(bytes: Arc<[u8]>, progress: Option<ProgressFn>) -> Self {
        Self {
            bytes,
            position: 0,
            last_percent: None,
            progress,
        }
    }

    fn percent(&self) -> u8 {
        if self.bytes.is_empty() {
            return 100;
        }
        ((self.position as u128 * 100) / self.bytes.len() as u128) as u8
    }
}

impl Read for ProgressReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.bytes[self.position..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.position += count;

        let percent = self.percent();
        if self.last_percent != Some(percent)
            && let Some(progress) = &self.progress
        {
            progress(percent);
        }
        self.last_percent = Some(percent);
        Ok(count)
    }
}
