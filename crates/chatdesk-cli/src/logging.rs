// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Filter from `CHATDESK_LOG`, else the configured level, else `info`.
pub fn env_filter(configured: &str) -> EnvFilter {
    match EnvFilter::try_from_env("CHATDESK_LOG") {
        Ok(filter) => filter,
        Err(_) => match configured.parse::<EnvFilter>() {
            Ok(filter) => filter,
            Err(error) => {
                eprintln!(
                    "warning: log level {configured:?} is not a valid filter ({error}); using info"
                );
                EnvFilter::new("info")
            }
        },
    }
}

/// The console owns the terminal, so events go to an append-only file.
pub fn init(level: &str, file: &Path) -> Result<()> {
    if let Some(parent) = file.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let writer = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .with_context(|| format!("open log file {}", file.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(Mutex::new(writer))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

#[cfg(test)]
mod tests {
    use super::env_filter;

    #[test]
    fn invalid_level_falls_back_to_info() {
        assert_eq!(env_filter("not a [filter").to_string(), "info");
    }

    #[test]
    fn configured_level_is_used() {
        if std::env::var_os("CHATDESK_LOG").is_none() {
            assert_eq!(env_filter("debug").to_string(), "debug");
        }
    }
}
