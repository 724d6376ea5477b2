// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder untuk event yang masuk dari adapter:
// - Tulis setiap Event ke file .jsonl (append).
// - BufWriter, flush periodik tiap 1s dan/atau tiap 1000 event.
// - Parent directory dibuat otomatis.
// - Jika tulis gagal, coba reopen file dan lanjut.
//
// ENV: set `RECORD_FILE=/path/to/events.jsonl` agar aktif.
//
use serde::Serialize;
use std::path::Path;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::domain::{AccountKey, SymbolInfo, Tick};
use crate::order::Order;
use crate::shutdown::{Shutdown, TaskGroup};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Tick(Tick),
    Symbol(SymbolInfo),
    Order { text: String },
    CmdResult { text: String },
    Note { note: &'static str, symbol: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub ts_ms: i64,
    pub account: AccountKey,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn now(account: AccountKey, kind: EventKind) -> Self {
        Self { ts_ms: chrono::Utc::now().timestamp_millis(), account, kind }
    }

    pub fn order(account: AccountKey, order: &Order) -> Self {
        Self::now(account, EventKind::Order { text: order.serialize() })
    }
}

/// Cheap handle; disabled recorders swallow events.
#[derive(Clone, Default)]
pub struct Recorder {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl Recorder {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn start(path: String, tasks: &TaskGroup) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tasks.spawn(move |shutdown| run(rx, path, shutdown));
        Self { tx: Some(tx) }
    }

    pub fn record(&self, ev: Event) {
        if let Some(tx) = &self.tx {
            if tx.send(ev).is_err() {
                debug!("recorder stopped, event dropped");
            }
        }
    }
}

async fn open_writer(path: &str) -> Option<BufWriter<File>> {
    // Pastikan parent directory ada (kalau ada)
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    match OpenOptions::new().create(true).append(true).open(path).await {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            error!(?e, %path, "recorder: open failed");
            None
        }
    }
}

async fn write_line(writer: &mut Option<BufWriter<File>>, path: &str, line: &[u8]) {
    if writer.is_none() {
        *writer = open_writer(path).await;
    }
    let Some(w) = writer.as_mut() else {
        return;
    };
    if let Err(e) = w.write_all(line).await {
        error!(?e, "recorder: write failed, attempting reopen");
        *writer = open_writer(path).await;
        // coba lagi sekali setelah reopen
        if let Some(w) = writer.as_mut() {
            if let Err(e2) = w.write_all(line).await {
                error!(?e2, "recorder: write failed again after reopen, drop event");
            }
        }
    }
}

pub async fn run(mut rx: mpsc::UnboundedReceiver<Event>, path: String, mut shutdown: Shutdown) {
    info!(%path, "recorder: started");
    let mut writer = open_writer(&path).await;

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut since_last_flush: u32 = 0;
    const FLUSH_EVERY_N_EVENTS: u32 = 1000;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else { break };
                let mut line = match serde_json::to_vec(&ev) {
                    Ok(v) => v,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };
                line.push(b'\n');
                write_line(&mut writer, &path, &line).await;

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    if let Some(w) = writer.as_mut() {
                        let _ = w.flush().await;
                    }
                    since_last_flush = 0;
                }
            }
            _ = tick.tick() => {
                if let Some(w) = writer.as_mut() {
                    let _ = w.flush().await;
                }
                since_last_flush = 0;
            }
            _ = shutdown.cancelled() => break,
        }
    }

    if let Some(w) = writer.as_mut() {
        let _ = w.flush().await;
    }
    info!("recorder: stopped");
}
