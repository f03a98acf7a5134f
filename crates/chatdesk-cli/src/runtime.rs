// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use chatdesk_api::{
    Client, ClientOptions, Connectivity, ConnectivityFlag, ConnectivityMonitor, PollHandle,
    ProbeTarget, ProgressFn, poll,
};
use chatdesk_app::{
    Candidate, ChatMessage, ReportStats, UploadSummary, ValidationResult, check_upload_file,
};
use chatdesk_tui::{ConsoleRuntime, InternalEvent};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Console runtime backed by the HTTP client.
pub struct ApiRuntime {
    client: Client,
    flag: ConnectivityFlag,
    poll_interval: Duration,
    probe_interval: Option<Duration>,
    monitor: Option<ConnectivityMonitor>,
}

impl ApiRuntime {
    pub fn new(
        base_url: &str,
        options: ClientOptions,
        poll_interval: Duration,
        probe_interval: Option<Duration>,
    ) -> Result<Self> {
        let flag = ConnectivityFlag::new(true);
        let client = Client::new(base_url, options, Arc::new(flag.clone()))
            .with_context(|| format!("create API client for {base_url}"))?;
        Ok(Self {
            client,
            flag,
            poll_interval,
            probe_interval,
            monitor: None,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Uploads through `client`, logging the outcome. Shared by the blocking and
/// background paths.
fn upload_with_client(
    client: &Client,
    path: &Path,
    progress: ProgressFn,
) -> Result<UploadSummary> {
    match client.upload_file(path, Some(progress)) {
        Ok(summary) => {
            info!(
                path = %path.display(),
                added = summary.added,
                skipped = summary.skipped,
                failed = summary.failed_entries().len(),
                "roster uploaded"
            );
            Ok(summary)
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "roster upload failed");
            Err(error.into())
        }
    }
}

/// File checks, then the structural validator.
pub fn validate_roster_file(path: &Path) -> Result<ValidationResult> {
    let metadata =
        fs::metadata(path).with_context(|| format!("read roster file {}", path.display()))?;
    if !metadata.is_file() {
        anyhow::bail!("{} is not a file", path.display());
    }
    check_upload_file(path, metadata.len())?;
    let result = chatdesk_sheet::validate_path(path);
    debug!(
        path = %path.display(),
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "roster validated"
    );
    Ok(result)
}

impl ConsoleRuntime for ApiRuntime {
    fn is_online(&mut self) -> bool {
        self.flag.is_online()
    }

    fn watch_connectivity(&mut self, tx: Sender<InternalEvent>) -> Result<()> {
        let Some(interval) = self.probe_interval else {
            return Ok(());
        };
        let target = ProbeTarget::from_base_url(self.client.base_url())?;
        info!(host = %target.host, port = target.port, "watching backend reachability");
        self.monitor = Some(ConnectivityMonitor::spawn_with_flag(
            self.flag.clone(),
            target,
            interval,
            move |online| {
                let _ = tx.send(InternalEvent::Connectivity { online });
            },
        ));
        Ok(())
    }

    fn list_all_chats(&mut self) -> Result<Vec<Candidate>> {
        Ok(self.client.list_all_chats()?)
    }

    fn list_escalated(&mut self) -> Result<Vec<Candidate>> {
        Ok(self.client.list_escalated()?)
    }

    fn list_candidates(&mut self) -> Result<Vec<Candidate>> {
        Ok(self.client.list_candidates()?)
    }

    fn report_stats(&mut self) -> Result<ReportStats> {
        Ok(self.client.report_stats()?)
    }

    fn chat_history(&mut self, phone_number: &str) -> Result<Vec<ChatMessage>> {
        Ok(self.client.chat_history(phone_number)?)
    }

    fn send_admin_reply(&mut self, phone_number: &str, text: &str) -> Result<()> {
        self.client.send_admin_reply(phone_number, text)?;
        info!(phone_number, "admin reply sent");
        Ok(())
    }

    fn resume_bot(&mut self, phone_number: &str) -> Result<()> {
        self.client.resume_bot(phone_number)?;
        info!(phone_number, "bot resumed");
        Ok(())
    }

    fn validate_roster(&mut self, path: &Path) -> Result<ValidationResult> {
        validate_roster_file(path)
    }

    fn upload_roster(&mut self, path: &Path, progress: ProgressFn) -> Result<UploadSummary> {
        upload_with_client(&self.client, path, progress)
    }

    fn spawn_upload(&mut self, path: &Path, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        let path: PathBuf = path.to_path_buf();
        thread::Builder::new()
            .name("chatdesk-upload".to_owned())
            .spawn(move || {
                let progress_tx = tx.clone();
                let progress: ProgressFn = Arc::new(move |percent| {
                    let _ = progress_tx.send(InternalEvent::UploadProgress { percent });
                });
                let result = upload_with_client(&client, &path, progress)
                    .map_err(|error| error.to_string());
                let _ = tx.send(InternalEvent::UploadFinished { result });
            })
            .context("spawn upload thread")?;
        Ok(())
    }

    fn start_history_poll(
        &mut self,
        phone_number: &str,
        generation: u64,
        tx: Sender<InternalEvent>,
    ) -> Result<PollHandle> {
        let client = self.client.clone();
        let phone_number = phone_number.to_owned();
        Ok(poll::spawn(
            generation,
            self.poll_interval,
            move || {
                client
                    .chat_history(&phone_number)
                    .map_err(|error| error.to_string())
            },
            move |tick| {
                tx.send(InternalEvent::HistoryPolled {
                    generation: tick.generation,
                    result: tick.value,
                })
                .is_ok()
            },
        ))
    }
}
