// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    pub phone_number: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub status: String,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_sender: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Candidate {
    pub fn status_kind(&self) -> CandidateStatus {
        CandidateStatus::classify(&self.status)
    }

    pub fn last_updated_at(&self) -> Option<OffsetDateTime> {
        self.last_updated
            .as_deref()
            .and_then(|raw| OffsetDateTime::parse(raw.trim(), &Rfc3339).ok())
    }

    /// `YYYY-MM-DD HH:MM` when the backend sent RFC 3339, the raw text otherwise.
    pub fn last_updated_label(&self) -> String {
        if let Some(at) = self.last_updated_at() {
            return at
                .format(&format_description!("[year]-[month]-[day] [hour]:[minute]"))
                .unwrap_or_default();
        }
        self.last_updated.clone().unwrap_or_default()
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.phone_number
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    Escalated,
    Completed,
    Active,
    Other,
}

impl CandidateStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Escalated => "escalated",
            Self::Completed => "completed",
            Self::Active => "active",
            Self::Other => "other",
        }
    }

    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "escalated" => Self::Escalated,
            "completed" => Self::Completed,
            "active" => Self::Active,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub total: usize,
    pub escalated: usize,
    pub completed: usize,
    pub active: usize,
}

impl StatusCounts {
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        let mut counts = Self {
            total: candidates.len(),
            ..Self::default()
        };
        for candidate in candidates {
            match candidate.status_kind() {
                CandidateStatus::Escalated => counts.escalated += 1,
                CandidateStatus::Completed => counts.completed += 1,
                CandidateStatus::Active => counts.active += 1,
                CandidateStatus::Other => {}
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    User,
    Bot,
    Admin,
    #[serde(other)]
    Other,
}

impl MessageSender {
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::Admin => "Admin",
            Self::Other => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: MessageSender,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Raw spreadsheet cell as read from the workbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            // Phone numbers stored as numbers must keep every digit.
            Self::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{value:.0}")
            }
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// One data row keyed by normalized header, in sheet column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, header: impl Into<String>, value: CellValue) {
        self.cells.push((header.into(), value));
    }

    /// Later columns win when a header repeats.
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .rev()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value)
    }

    pub fn text(&self, header: &str) -> String {
        self.get(header).map(ToString::to_string).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub preview: Option<Vec<Row>>,
}

impl ValidationResult {
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            warnings: Vec::new(),
            preview: None,
        }
    }

    /// Warnings never affect validity.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UploadSummary {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub added: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub failed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl UploadSummary {
    pub fn failed_entries(&self) -> Vec<String> {
        self.failed
            .iter()
            .flatten()
            .map(|entry| match entry {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect()
    }

    pub fn headline(&self) -> String {
        format!(
            "Added: {} | Skipped: {} | Failed: {}",
            self.added,
            self.skipped,
            self.failed.as_ref().map_or(0, Vec::len)
        )
    }
}

pub type StatsSection = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ReportStats {
    #[serde(default)]
    pub summary: StatsSection,
    #[serde(default)]
    pub engagement_funnel: StatsSection,
    #[serde(default)]
    pub escalation_stats: StatsSection,
}

impl ReportStats {
    pub fn sections(&self) -> [(&'static str, &StatsSection); 3] {
        [
            ("summary", &self.summary),
            ("engagement funnel", &self.engagement_funnel),
            ("escalations", &self.escalation_stats),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabKind {
    Upload,
    Escalation,
    Reports,
    AllChats,
}

impl TabKind {
    pub const ALL: [Self; 4] = [Self::Upload, Self::Escalation, Self::Reports, Self::AllChats];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Escalation => "escalation",
            Self::Reports => "reports",
            Self::AllChats => "all chats",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Upload => "upload candidate rosters",
            Self::Escalation => "handle escalated chats",
            Self::Reports => "view analytics",
            Self::AllChats => "view all conversations",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upload" => Some(Self::Upload),
            "escalation" => Some(Self::Escalation),
            "reports" => Some(Self::Reports),
            "allchats" | "all_chats" | "all chats" => Some(Self::AllChats),
            _ => None,
        }
    }

    /// Tabs that show one candidate's conversation and poll it.
    pub const fn has_chat_view(self) -> bool {
        matches!(self, Self::Escalation | Self::AllChats)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Input,
}
