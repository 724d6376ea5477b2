// ===============================
// src/backend.rs
// ===============================
//
// Merakit sisi backend:
//   AccountManager -> ChannelRegistry -> Communicator -> TradeManager -> Executor
//
use std::sync::Arc;
use tracing::{info, warn};

use crate::accounts::AccountManager;
use crate::communicator::{Communicator, CommunicatorObserver};
use crate::config::Settings;
use crate::console::Console;
use crate::discovery::{ChannelDiscovery, ChannelRegistry};
use crate::executor::Executor;
use crate::recorder::Recorder;
use crate::shutdown::TaskGroup;
use crate::strategy::ClimberFactory;
use crate::trader::TradeManager;

pub struct Backend {
    pub accounts: Arc<AccountManager>,
    pub communicator: Arc<Communicator>,
    pub traders: Arc<TradeManager>,
    pub executor: Executor,
}

impl Backend {
    /// Builds every piece and starts discovery, the note processor and the sweep.
    pub fn start(settings: &Settings, console: Console, recorder: Recorder, tasks: Arc<TaskGroup>) -> Self {
        let ns = settings.namespace();
        let accounts = Arc::new(AccountManager::new());
        let discovery = ChannelDiscovery::new(Arc::new(ns.clone()));
        let registry = ChannelRegistry::new(Arc::clone(&accounts), discovery);
        let communicator = Arc::new(Communicator::new(ns, registry, tasks, settings.scan_interval));
        let traders = Arc::new(TradeManager::new(Arc::clone(&communicator), console.clone(), recorder));

        let mut executor = Executor::new(console, Arc::clone(&accounts), Arc::clone(&traders));
        if let Err(e) = executor.register_strategy(Arc::new(ClimberFactory)) {
            warn!(%e, "strategy registration failed");
        }

        let observer: Arc<dyn CommunicatorObserver> = traders.clone();
        communicator.run(observer);
        info!(root = %settings.ipc_root.display(), "backend started");

        Self { accounts, communicator, traders, executor }
    }
}
