// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use chatdesk_app::{Candidate, ChatMessage, MessageSender};
use rust_xlsxwriter::Workbook;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime, Time};

const FIRST_NAMES: [&str; 16] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Elliot", "Robin", "Cameron", "Hayden", "Rowan",
];
const LAST_NAMES: [&str; 18] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Campbell", "Turner", "Flores", "Bennett", "Price", "Morris", "Foster", "Brooks",
];
const STATUSES: [&str; 4] = ["active", "escalated", "completed", "pending"];
const USER_LINES: [&str; 6] = [
    "Hi, is the position still open?",
    "What are the working hours?",
    "Can I speak to a person please?",
    "I uploaded my documents yesterday.",
    "Is there parking on site?",
    "Thanks, that helps.",
];
const BOT_LINES: [&str; 5] = [
    "Thanks for reaching out! Could you confirm your full name?",
    "Shifts run from 8am to 4pm on weekdays.",
    "I have flagged this for a recruiter.",
    "Your application is in review.",
    "Is there anything else I can help with?",
];

pub const ROSTER_HEADERS: [&str; 3] = ["phone_number", "name", "surname"];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Deterministic candidates, conversations and roster rows.
#[derive(Debug, Clone)]
pub struct CandidateFaker {
    rng: DeterministicRng,
}

impl CandidateFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn phone_number(&mut self) -> String {
        let mut phone = String::from("1555");
        for _ in 0..7 {
            phone.push(char::from(b'0' + self.rng.int_n(10) as u8));
        }
        phone
    }

    pub fn candidate(&mut self) -> Candidate {
        let status = self.pick(&STATUSES);
        self.candidate_with_status(status)
    }

    pub fn candidate_with_status(&mut self, status: &str) -> Candidate {
        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        let minutes = self.rng.int_n(60 * 24 * 30) as i64;
        let updated = reference_now() + time::Duration::minutes(minutes);
        let last_message = self.pick(&USER_LINES).to_owned();
        Candidate {
            name: format!("{first} {last}"),
            phone_number: self.phone_number(),
            status: status.to_owned(),
            last_message: Some(last_message),
            last_sender: Some("user".to_owned()),
            last_updated: updated.format(&Rfc3339).ok(),
        }
    }

    /// Alternating user and bot messages, oldest first.
    pub fn conversation(&mut self, turns: usize) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turns * 2);
        let mut at = reference_now();
        for _ in 0..turns {
            at += time::Duration::minutes(1 + self.rng.int_n(10) as i64);
            messages.push(ChatMessage {
                from: MessageSender::User,
                text: self.pick(&USER_LINES).to_owned(),
                timestamp: at.format(&Rfc3339).ok(),
            });
            at += time::Duration::seconds(5);
            messages.push(ChatMessage {
                from: MessageSender::Bot,
                text: self.pick(&BOT_LINES).to_owned(),
                timestamp: at.format(&Rfc3339).ok(),
            });
        }
        messages
    }

    /// Roster rows without the header.
    pub fn roster_rows(&mut self, count: usize) -> Vec<Vec<String>> {
        (0..count)
            .map(|_| {
                vec![
                    self.phone_number(),
                    self.pick(&FIRST_NAMES).to_owned(),
                    self.pick(&LAST_NAMES).to_owned(),
                ]
            })
            .collect()
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

fn reference_now() -> OffsetDateTime {
    let date = Date::from_calendar_date(2026, Month::January, 1).unwrap_or(Date::MIN);
    date.with_time(Time::MIDNIGHT).assume_utc()
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}

/// Builds a single-sheet workbook from string rows, header first.
pub fn roster_xlsx<S: AsRef<str>>(rows: &[Vec<S>]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Candidates").context("name roster sheet")?;
    for (row_index, row) in rows.iter().enumerate() {
        for (col_index, cell) in row.iter().enumerate() {
            let cell = cell.as_ref();
            if cell.is_empty() {
                continue;
            }
            sheet
                .write_string(row_index as u32, col_index as u16, cell)
                .with_context(|| format!("write cell {row_index},{col_index}"))?;
        }
    }
    workbook.save_to_buffer().context("serialize roster workbook")
}

/// Like [`roster_xlsx`] but phone numbers in column 0 are stored as numbers,
/// the way spreadsheet apps save digit-only columns.
pub fn roster_xlsx_numeric_phones<S: AsRef<str>>(rows: &[Vec<S>]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (row_index, row) in rows.iter().enumerate() {
        for (col_index, cell) in row.iter().enumerate() {
            let cell = cell.as_ref();
            if cell.is_empty() {
                continue;
            }
            let (row_at, col_at) = (row_index as u32, col_index as u16);
            let written = match cell.parse::<f64>() {
                Ok(number) if row_index > 0 && col_index == 0 => {
                    sheet.write_number(row_at, col_at, number)
                }
                _ => sheet.write_string(row_at, col_at, cell),
            };
            written.with_context(|| format!("write cell {row_index},{col_index}"))?;
        }
    }
    workbook.save_to_buffer().context("serialize roster workbook")
}

pub fn roster_csv<S: AsRef<str>>(rows: &[Vec<S>]) -> String {
    let mut out = String::new();
    for row in rows {
        let line: Vec<&str> = row.iter().map(AsRef::as_ref).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Header plus `count` valid rows.
pub fn valid_roster(count: usize) -> Vec<Vec<String>> {
    let mut rows = vec![ROSTER_HEADERS.iter().map(|h| (*h).to_owned()).collect()];
    rows.extend(CandidateFaker::new(7).roster_rows(count));
    rows
}

pub fn temp_roster(file_name: &str, bytes: &[u8]) -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join(file_name);
    std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
    Ok((dir, path))
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
    pub delay: Duration,
}

impl MockResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: "application/json",
            delay: Duration::ZERO,
        }
    }

    pub fn value(status: u16, body: &serde_json::Value) -> Self {
        Self::json(status, body.to_string())
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: "text/plain",
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }

    pub fn body_json(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.body).context("decode recorded body")
    }
}

/// Scripted HTTP backend on an ephemeral port. Responses are served in order;
/// once the script runs out the fallback answers, or a 500 when none is set.
pub struct MockBackend {
    base_url: String,
    stop: Arc<AtomicBool>,
    script: Arc<Mutex<VecDeque<MockResponse>>>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockBackend {
    pub fn start(script: Vec<MockResponse>) -> Result<Self> {
        Self::start_with_fallback(script, None)
    }

    pub fn start_with_fallback(
        script: Vec<MockResponse>,
        fallback: Option<MockResponse>,
    ) -> Result<Self> {
        let server = tiny_http::Server::http("127.0.0.1:0")
            .map_err(|error| anyhow!("start mock server: {error}"))?;
        let base_url = format!("http://{}", server.server_addr());
        let stop = Arc::new(AtomicBool::new(false));
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let recorded = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let stop = Arc::clone(&stop);
            let script = Arc::clone(&script);
            let recorded = Arc::clone(&recorded);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let mut request = match server.recv_timeout(Duration::from_millis(20)) {
                        Ok(Some(request)) => request,
                        Ok(None) => continue,
                        Err(_) => break,
                    };
                    let mut body = Vec::new();
                    let _ = request.as_reader().read_to_end(&mut body);
                    let entry = RecordedRequest {
                        method: request.method().to_string(),
                        url: request.url().to_owned(),
                        headers: request
                            .headers()
                            .iter()
                            .map(|header| (header.field.to_string(), header.value.to_string()))
                            .collect(),
                        body,
                    };
                    if let Ok(mut recorded) = recorded.lock() {
                        recorded.push(entry);
                    }

                    let next = script.lock().ok().and_then(|mut script| script.pop_front());
                    let scripted = next
                        .or_else(|| fallback.clone())
                        .unwrap_or_else(|| MockResponse::text(500, "unscripted request"));
                    if !scripted.delay.is_zero() {
                        thread::sleep(scripted.delay);
                    }
                    let mut response = tiny_http::Response::from_string(scripted.body)
                        .with_status_code(scripted.status);
                    if let Ok(header) =
                        tiny_http::Header::from_bytes("Content-Type", scripted.content_type)
                    {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
            })
        };

        Ok(Self {
            base_url,
            stop,
            script,
            recorded,
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn push(&self, response: MockResponse) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .map(|recorded| recorded.clone())
            .unwrap_or_default()
    }

    /// Stops the server and returns every request it saw.
    pub fn finish(mut self) -> Vec<RecordedRequest> {
        self.shutdown();
        self.requests()
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
