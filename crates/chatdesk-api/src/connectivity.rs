// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::ApiError;

/// Answers "is the network reachable right now". Checked before every attempt.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Shared flag flipped by a monitor or by tests.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag(Arc<AtomicBool>);

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn from_base_url(base_url: &str) -> Result<Self, ApiError> {
        let invalid = |message: &str| ApiError::InvalidBaseUrl {
            url: base_url.to_owned(),
            message: message.to_owned(),
        };
        let parsed = Url::parse(base_url).map_err(|error| invalid(&error.to_string()))?;
        let host = parsed.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }

    /// One TCP connect attempt against any resolved address.
    pub fn probe(&self, timeout: Duration) -> bool {
        let Ok(addrs) = (self.host.as_str(), self.port).to_socket_addrs() else {
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
    }
}

/// Background thread that probes the backend host and keeps a
/// [`ConnectivityFlag`] current. Stops when dropped.
pub struct ConnectivityMonitor {
    flag: ConnectivityFlag,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    pub fn spawn<F>(target: ProbeTarget, interval: Duration, on_change: F) -> Self
    where
        F: Fn(bool) + Send + 'static,
    {
        Self::spawn_with_flag(ConnectivityFlag::new(true), target, interval, on_change)
    }

    /// Keeps an existing flag current, e.g. one a [`Client`](crate::Client)
    /// already checks.
    pub fn spawn_with_flag<F>(
        flag: ConnectivityFlag,
        target: ProbeTarget,
        interval: Duration,
        on_change: F,
    ) -> Self
    where
        F: Fn(bool) + Send + 'static,
    {
        let shared = flag.clone();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let probe_timeout = interval.min(Duration::from_secs(2));

        let handle = thread::spawn(move || {
            let mut last = shared.is_online();
            loop {
                let online = target.probe(probe_timeout);
                shared.set_online(online);
                if online != last {
                    info!(host = %target.host, online, "connectivity changed");
                    on_change(online);
                    last = online;
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("connectivity monitor stopped");
        });

        Self {
            flag,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn flag(&self) -> ConnectivityFlag {
        self.flag.clone()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
