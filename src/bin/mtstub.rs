// ===============================
// src/bin/mtstub.rs
// ===============================
//
// Host palsu: meniru terminal trading yang memuat adapter.
//   - satu akun, satu symbol
//   - tick acak tiap --tick-interval-ms
//   - command dari backend dicetak lalu dijawab "error - not implemented"
//
use clap::Parser;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fxcolt::adapter::{AdapterHost, CommandSlot};
use fxcolt::config;
use fxcolt::metrics;
use fxcolt::domain::AccountLogin;

const NOT_IMPLEMENTED: &str = "error - not implemented";

/// Fake trading host driving the adapter entry points.
#[derive(Parser, Debug)]
#[command(name = "mtstub", version)]
struct Args {
    /// Broker name as the host reports it (spaces are allowed).
    #[arg(long, default_value = "FakeBroker")]
    broker: String,

    #[arg(long, default_value_t = 12345678)]
    login: AccountLogin,

    #[arg(long, default_value = "EURPLN")]
    symbol: String,

    /// Delay between generated ticks.
    #[arg(long, default_value_t = 1000)]
    tick_interval_ms: u64,
}

fn spawn_ticks(host: Arc<AdapterHost>, symbol: String, every: Duration, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut rng = rand::thread_rng();
        while !stop.load(Ordering::Relaxed) {
            let u: f64 = rng.gen_range(4.23..4.25);
            let bid = rng.gen_range(4.23..4.25);
            let ask = bid + u / 1000.0;
            let last = (bid + ask + u) / 3.0;
            host.dump_tick(&symbol, chrono::Utc::now().timestamp(), bid, ask, last);
            thread::sleep(every);
        }
    })
}

fn format_command(slot: &CommandSlot) -> String {
    let mut line = slot.name().to_string();
    for arg in slot.args() {
        line.push(' ');
        line.push_str(arg);
    }
    if !slot.tickets().is_empty() {
        line.push_str(" --");
        for ticket in slot.tickets() {
            line.push_str(&format!(" {ticket}"));
        }
    }
    line
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = config::load();
    let poll = settings.poll_interval;
    // counter sisi adapter (binds, commands_completed) ikut terdaftar
    metrics::setup(settings.metrics_port);

    let host = Arc::new(AdapterHost::new(settings, Handle::current()));
    host.register_symbol(&args.broker, args.login, &args.symbol);
    host.dump_symbol(&args.symbol);
    info!(broker = %args.broker, login = args.login, symbol = %args.symbol, "stub host running");

    let stop = Arc::new(AtomicBool::new(false));
    let ticks = spawn_ticks(
        Arc::clone(&host),
        args.symbol.clone(),
        Duration::from_millis(args.tick_interval_ms),
        Arc::clone(&stop),
    );

    let mut slot = CommandSlot::with_capacity(
        host.max_cmd_arg_count(),
        host.max_cmd_string_len(),
        host.max_cmd_ticket_count(),
    );
    let mut interval = tokio::time::interval(poll);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                while host.get_command(&mut slot) {
                    println!("{}", format_command(&slot));
                    host.on_command_completed(NOT_IMPLEMENTED);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received");
                break;
            }
        }
    }

    host.unregister_symbol(&args.symbol);
    stop.store(true, Ordering::Relaxed);
    let _ = tokio::task::spawn_blocking(move || ticks.join()).await;
    host.shutdown().await;
}
