// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result};
use chatdesk_app::{AppState, ValidationResult};
use config::Config;
use runtime::{ApiRuntime, validate_roster_file};
use std::env;
use std::path::PathBuf;
use tracing::info;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("{error:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(0);
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(0);
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(0);
    }

    if let Some(path) = &options.validate {
        let result = validate_roster_file(path)?;
        print!("{}", validation_report(&result));
        return Ok(if result.is_valid() { 0 } else { 1 });
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `chatdesk --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let base_url = config.base_url();
    let runtime = ApiRuntime::new(
        &base_url,
        config.client_options()?,
        config.poll_interval()?,
        config.connectivity_probe()?,
    )
    .with_context(|| {
        format!(
            "invalid [api] config in {}; fix base_url or set CHATDESK_BASE_URL",
            options.config_path.display()
        )
    })?;

    if options.check_only {
        let chats = runtime
            .client()
            .list_all_chats()
            .with_context(|| format!("reach backend at {base_url}"))?;
        println!("ok: {base_url} answered with {} chats", chats.len());
        return Ok(0);
    }

    logging::init(config.log_level(), &config.log_file()?)?;
    info!(base_url = %base_url, version = env!("CARGO_PKG_VERSION"), "chatdesk starting");

    let mut state = AppState {
        active_tab: config.default_tab(),
        ..AppState::default()
    };
    let mut runtime = runtime;
    chatdesk_tui::run_app(&mut state, &mut runtime)?;
    Ok(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    check_only: bool,
    validate: Option<PathBuf>,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        check_only: false,
        validate: None,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--validate" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--validate requires a roster file path"))?;
                options.validate = Some(PathBuf::from(value.as_ref()));
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn validation_report(result: &ValidationResult) -> String {
    let mut out = String::new();
    out.push_str(if result.is_valid() {
        "valid\n"
    } else {
        "invalid\n"
    });
    for error in &result.errors {
        out.push_str(&format!("error: {error}\n"));
    }
    for warning in &result.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    if let Some(preview) = &result.preview {
        out.push_str(&format!("preview: {} rows\n", preview.len()));
        for row in preview {
            let cells: Vec<String> = row
                .iter()
                .map(|(header, value)| format!("{header}={value}"))
                .collect();
            out.push_str(&format!("  {}\n", cells.join(", ")));
        }
    }
    out
}

fn print_help() {
    println!("chatdesk");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config and reach the backend once");
    println!("  --validate <file>        Validate a roster spreadsheet and exit");
    println!("  --help                   Show this help");
}
