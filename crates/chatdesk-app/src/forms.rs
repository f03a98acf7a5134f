// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use crate::Candidate;

/// Largest roster accepted for upload.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const UPLOAD_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "csv"];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyForm {
    pub phone_number: Option<String>,
    pub text: String,
}

impl ReplyForm {
    pub fn for_candidate(candidate: &Candidate) -> Self {
        Self {
            phone_number: Some(candidate.phone_number.clone()),
            text: String::new(),
        }
    }

    /// Returns the phone number and the reply text ready to send.
    pub fn validate(&self) -> Result<(&str, &str)> {
        let Some(phone) = self
            .phone_number
            .as_deref()
            .filter(|phone| !phone.trim().is_empty())
        else {
            bail!("select a candidate before replying");
        };
        if self.text.trim().is_empty() {
            bail!("enter a message to send");
        }
        Ok((phone, &self.text))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadForm {
    pub path_input: String,
}

impl UploadForm {
    pub fn path(&self) -> Option<PathBuf> {
        let trimmed = self.path_input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}

/// File checks that run before the roster is parsed.
pub fn check_upload_file(path: &Path, size_bytes: u64) -> Result<()> {
    if size_bytes > MAX_UPLOAD_BYTES {
        bail!("file size too large; select a file smaller than 10MB");
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !UPLOAD_EXTENSIONS.contains(&extension.as_str()) {
        bail!("invalid file type {extension:?}; select an Excel (.xlsx, .xls) or CSV file");
    }
    Ok(())
}
