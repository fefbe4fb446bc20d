#![allow(dead_code)]

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};
use std::sync::{Mutex, Once};
use std::time::Duration;

use anyhow::{anyhow, Result};
use portwait_rs::fallback::CommandRunner;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// Reserve a loopback port that currently has no listener.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Runner that answers from a table of canned outputs and records every call.
/// Entries are keyed by program or by the full command line, which wins.
/// Programs missing from the table behave like "command not found".
#[derive(Default)]
pub struct CannedRunner {
    responses: HashMap<String, (i32, String)>,
    calls: Mutex<Vec<String>>,
}

impl CannedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, program: &str, code: i32, stdout: &str) -> Self {
        self.responses
            .insert(program.to_string(), (code, stdout.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for CannedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        self.calls.lock().unwrap().push(program.to_string());
        let line = format!("{program} {}", args.join(" "));
        let (code, stdout) = self
            .responses
            .get(&line)
            .or_else(|| self.responses.get(program))
            .ok_or_else(|| anyhow!("{program}: command not found"))?;
        Ok(Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.clone().into_bytes(),
            stderr: Vec::new(),
        })
    }
}

/// Runner whose every command hangs for `delay` and then fails.
pub struct SlowRunner {
    pub delay: Duration,
}

impl CommandRunner for SlowRunner {
    async fn run(&self, program: &str, _args: &[String]) -> Result<Output> {
        tokio::time::sleep(self.delay).await;
        Err(anyhow!("{program}: too slow"))
    }
}
