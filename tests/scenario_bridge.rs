// ===============================
// tests/scenario_bridge.rs
// ===============================
//
// Adapter host dan backend dalam satu proses, lewat socket sungguhan.
//
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use fxcolt::adapter::{AdapterHost, CommandSlot};
use fxcolt::backend::Backend;
use fxcolt::config::Settings;
use fxcolt::console::Console;
use fxcolt::domain::{AccountInfo, AccountKey};
use fxcolt::recorder::Recorder;
use fxcolt::shutdown::TaskGroup;

async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn fast_settings(root: &std::path::Path) -> Settings {
    let mut settings = Settings::with_root(root);
    settings.bind_backoff = Duration::from_millis(20);
    settings.scan_interval = Duration::from_millis(50);
    settings.poll_interval = Duration::from_millis(20);
    settings
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn host_and_backend_exchange_everything() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());

    let host = AdapterHost::new(settings.clone(), Handle::current());
    host.register_symbol("Fake Broker", 12345678, "EURPLN");

    let console = Console::capture();
    let tasks = Arc::new(TaskGroup::new());
    let mut backend = Backend::start(&settings, console.clone(), Recorder::disabled(), Arc::clone(&tasks));

    let key = AccountKey::from_raw(0);
    let communicator = Arc::clone(&backend.communicator);
    assert!(eventually(|| communicator.connection(key).is_some_and(|c| c.is_connected())).await);
    assert_eq!(backend.accounts.get(key), Some(AccountInfo::new("Fake_Broker", 12345678)));

    // notes only arrive once the mailbox exists
    let mailbox = dir.path().join("mailslot").join("fxcolt").join("note");
    assert!(eventually(|| mailbox.exists()).await);
    host.register_symbol("Fake Broker", 12345678, "GBPUSD");
    let trader = backend.traders.trader(key).unwrap();
    assert!(eventually(|| trader.symbols().contains(&"GBPUSD".to_string())).await);
    assert!(console.take().contains("onRegisterSymbol GBPUSD\n"));

    backend.executor.execute_line("sel 0").unwrap();
    assert_eq!(console.take(), "0 Fake_Broker 12345678\n");
    backend.executor.execute_line("st").unwrap();

    host.dump_tick("GBPUSD", 7, 1.25, 1.5, 1.375);
    host.dump_symbol("GBPUSD");
    assert!(eventually(|| console.contents().contains("onTick GBPUSD 1.5 1.25 1.375 7\n")).await);
    assert!(eventually(|| console.contents().contains("onSymbol GBPUSD\n")).await);

    backend.executor.execute_line("close 100 101").unwrap();
    let mut slot = CommandSlot::with_capacity(
        host.max_cmd_arg_count(),
        host.max_cmd_string_len(),
        host.max_cmd_ticket_count(),
    );
    assert!(eventually(|| host.get_command(&mut slot)).await);
    assert_eq!(slot.name(), "close");
    assert!(slot.args().is_empty());
    assert_eq!(slot.tickets(), &[100, 101]);
    // still in flight
    assert!(!host.get_command(&mut slot));
    host.on_command_completed("done");
    assert!(eventually(|| console.contents().contains("onCmdResult cmd sent successfully\n")).await);

    host.unregister_symbol("GBPUSD");
    assert!(eventually(|| !trader.symbols().contains(&"GBPUSD".to_string())).await);

    host.shutdown().await;
    assert!(eventually(|| communicator.connection(key).is_some_and(|c| !c.is_connected())).await);
    tasks.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_follows_a_restarted_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());
    let tasks = Arc::new(TaskGroup::new());
    let backend = Backend::start(&settings, Console::capture(), Recorder::disabled(), Arc::clone(&tasks));
    let key = AccountKey::from_raw(0);
    let connected = |backend: &Backend| backend.communicator.connection(key).is_some_and(|c| c.is_connected());

    let first = AdapterHost::new(settings.clone(), Handle::current());
    first.register_symbol("ib", 555, "EURUSD");
    assert!(eventually(|| connected(&backend)).await);
    first.shutdown().await;
    assert!(eventually(|| !connected(&backend)).await);

    let second = AdapterHost::new(settings.clone(), Handle::current());
    second.register_symbol("ib", 555, "EURUSD");
    assert!(eventually(|| connected(&backend)).await);
    // same account, same key
    assert_eq!(backend.accounts.keys(), vec![key]);

    second.shutdown().await;
    tasks.shutdown().await;
}
