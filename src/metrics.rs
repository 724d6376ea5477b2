// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Channel traffic (label: kind = tick|symbol|order|cmd) --------
pub static MSGS_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ipc_messages_sent_total", "messages written to a channel"),
        &["kind"],
    )
    .unwrap()
});

pub static MSGS_RECV: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ipc_messages_received_total", "messages read from a channel"),
        &["kind"],
    )
    .unwrap()
});

pub static CHANNEL_BINDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ipc_channel_binds_total", "server channels bound by the adapter"),
        &["kind"],
    )
    .unwrap()
});

pub static CHANNEL_OPENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ipc_channel_opens_total", "client channels opened by the backend"),
        &["kind"],
    )
    .unwrap()
});

// -------- Notes (label: note = reg_symbol|unreg_symbol) --------
pub static NOTES_RECV: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("notes_received_total", "symbol notes received from the mailbox"),
        &["note"],
    )
    .unwrap()
});

// -------- Commands --------
pub static CMDS_QUEUED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("commands_queued_total", "commands accepted for the host").unwrap());

pub static CMDS_REJECTED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("commands_rejected_total", "command lines refused by the parser").unwrap());

pub static CMDS_COMPLETED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("commands_completed_total", "commands completed by the host").unwrap());

// -------- Accounts --------
pub static ACCOUNTS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("accounts_detected", "accounts discovered so far").unwrap());

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(MSGS_SENT.clone())),
        REGISTRY.register(Box::new(MSGS_RECV.clone())),
        REGISTRY.register(Box::new(CHANNEL_BINDS.clone())),
        REGISTRY.register(Box::new(CHANNEL_OPENS.clone())),
        REGISTRY.register(Box::new(NOTES_RECV.clone())),
        REGISTRY.register(Box::new(CMDS_QUEUED.clone())),
        REGISTRY.register(Box::new(CMDS_REJECTED.clone())),
        REGISTRY.register(Box::new(CMDS_COMPLETED.clone())),
        REGISTRY.register(Box::new(ACCOUNTS.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Metrics server di OS thread sendiri (runtime Tokio tetap bersih)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(?e, %addr, "metrics bind failed, metrics disabled");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}

/// Registers the counters and, with a port, serves them. Used by every binary.
pub fn setup(port: Option<u16>) {
    init();
    if let Some(port) = port {
        tokio::spawn(serve_metrics(port));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_show_up_in_text_output() {
        init();
        MSGS_SENT.with_label_values(&["tick"]).inc();
        CMDS_QUEUED.inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("ipc_messages_sent_total"));
        assert!(text.contains("commands_queued_total"));
    }

    #[test]
    fn adapter_counters_are_registered_without_a_port() {
        setup(None);
        CHANNEL_BINDS.with_label_values(&["cmd"]).inc();
        CMDS_COMPLETED.inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("ipc_channel_binds_total{kind=\"cmd\"}"));
        assert!(text.contains("commands_completed_total"));
    }
}
