// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod client;
mod connectivity;
mod error;
pub mod poll;
mod retry;

pub use client::{
    Client, ClientOptions, DEFAULT_CANDIDATES_PATH, DEFAULT_REPORT_STATS_PATH, ProgressFn,
    RequestOptions, TUNNEL_WARNING_HEADER,
};
pub use connectivity::{
    AlwaysOnline, Connectivity, ConnectivityFlag, ConnectivityMonitor, ProbeTarget,
};
pub use error::ApiError;
pub use poll::{PollHandle, PollTick};
pub use retry::RetryPolicy;
pub use reqwest::Method;
