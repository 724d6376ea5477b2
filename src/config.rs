// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : fxcolt - IPC bridge between a sandboxed trading host and a backend
Module  : config.rs
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
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::ipc::Namespace;

#[derive(Clone, Debug)]
pub struct Settings {
    // namespace (Unix: root dir socket file; Windows: diabaikan)
    pub ipc_root: PathBuf,

    // timing
    pub bind_backoff: Duration,
    pub scan_interval: Duration,
    pub poll_interval: Duration,

    // files/metrics
    pub metrics_port: Option<u16>,
    pub record_file: Option<String>,
}

impl Settings {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.ipc_root.clone())
    }

    /// Defaults rooted at `ipc_root`, without touching the environment.
    pub fn with_root(ipc_root: impl Into<PathBuf>) -> Self {
        Self {
            ipc_root: ipc_root.into(),
            bind_backoff: Duration::from_millis(1000),
            scan_interval: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1000),
            metrics_port: None,
            record_file: None,
        }
    }
}

fn millis(key: &str, default_ms: u64) -> Duration {
    let ms = env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

pub fn load() -> Settings {
    // Pastikan .env dibaca (agar FXCOLT_IPC_ROOT, RECORD_FILE, dll ter-load)
    let _ = dotenv();

    let ipc_root = env::var("FXCOLT_IPC_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("fxcolt-ipc"));

    let bind_backoff  = millis("FXCOLT_BIND_BACKOFF_MS", 1000);
    let scan_interval = millis("FXCOLT_SCAN_INTERVAL_MS", 1000);
    let poll_interval = millis("FXCOLT_POLL_INTERVAL_MS", 1000);

    let record_file  = env::var("RECORD_FILE").ok().filter(|s| !s.is_empty());
    let metrics_port = env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok());

    Settings {
        ipc_root,
        bind_backoff,
        scan_interval,
        poll_interval,
        metrics_port,
        record_file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_root_uses_one_second_timings() {
        let s = Settings::with_root("/tmp/fx");
        assert_eq!(s.ipc_root, PathBuf::from("/tmp/fx"));
        assert_eq!(s.bind_backoff, Duration::from_secs(1));
        assert_eq!(s.scan_interval, Duration::from_secs(1));
        assert!(s.metrics_port.is_none());
        assert_eq!(s.namespace().root(), std::path::Path::new("/tmp/fx"));
    }

    #[test]
    fn millis_falls_back_on_garbage() {
        assert_eq!(millis("FXCOLT_TEST_SURELY_UNSET_KEY", 250), Duration::from_millis(250));
    }
}
