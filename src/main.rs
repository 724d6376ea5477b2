// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/fxcolt

 # backend + metrics + rekam event
 METRICS_PORT=9898 RECORD_FILE=data/events.jsonl cargo run --bin fxcolt

 # host palsu di terminal lain (root namespace harus sama)
 cargo run --bin mtstub -- --broker "Fake Broker" --login 12345678 --symbol EURPLN

 curl -s localhost:9898/metrics | grep '^ipc_messages_received_total'
*/
/*
=============================================================================
Project : fxcolt - IPC bridge between a sandboxed trading host and a backend
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Adapter side publishes ticks/symbols/orders over per-account,
          per-kind pipes and takes commands; backend side discovers the
          pipes, keeps them connected, routes REPL/strategy commands back,
          exposes Prometheus metrics, and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fxcolt::backend::Backend;
use fxcolt::config;
use fxcolt::console::Console;
use fxcolt::consts::CMD_EXIT;
use fxcolt::metrics;
use fxcolt::recorder::Recorder;
use fxcolt::shutdown::TaskGroup;

const PROMPT: &str = "$ ";

// Stdin di OS thread sendiri: read yang blocking tidak menahan shutdown runtime
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(?e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

fn prompt() {
    let mut out = std::io::stdout();
    let _ = out.write_all(PROMPT.as_bytes());
    let _ = out.flush();
}

#[tokio::main]
async fn main() {
    // ---- Logging (stderr, biar REPL di stdout tetap bersih) ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // ---- Load config ----
    let settings = config::load();
    info!(
        ipc_root = %settings.ipc_root.display(),
        scan_ms = settings.scan_interval.as_millis() as u64,
        metrics_port = ?settings.metrics_port,
        record_file = ?settings.record_file,
        "startup config"
    );

    // ---- Metrics ----
    metrics::setup(settings.metrics_port);

    let tasks = Arc::new(TaskGroup::new());

    // ---- Recorder (optional) ----
    let recorder = match settings.record_file.clone() {
        Some(path) => Recorder::start(path, &tasks),
        None => Recorder::disabled(),
    };

    // ---- Backend ----
    let mut backend = Backend::start(&settings, Console::stdout(), recorder, Arc::clone(&tasks));

    // ---- REPL ----
    let mut lines = spawn_stdin_reader();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received");
                break;
            }
        };
        // stdin ditutup (EOF)
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == CMD_EXIT {
            break;
        }
        if let Err(e) = backend.executor.execute_line(line) {
            eprintln!("{e}");
        }
    }

    info!("shutting down");
    tasks.shutdown().await;
}
