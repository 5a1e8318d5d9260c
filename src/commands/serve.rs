use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use crate::bot::Bot;
use crate::config::Config;
use crate::error::ExitError;
use crate::guard::{self, GuardStatus};
use crate::keepalive;
use crate::storage::JsonFileStorage;
use crate::store::items::ItemStore;
use crate::store::subscribers::SubscriberRegistry;
use crate::telegram::{self, TelegramTransport};

/// Long-poll window handed to the API. The transport's own timeout sits
/// above this.
const POLL_WINDOW_SECS: u64 = 40;
/// Back-off after a failed poll so an API outage doesn't spin the loop.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Args)]
pub struct ServeArgs {}

impl ServeArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let config = Config::load()?;

        match guard::acquire(&config.data_dir).map_err(|e| ExitError::Storage(e.to_string()))? {
            GuardStatus::Acquired => {}
            GuardStatus::AlreadyRunning(pid) => {
                // Two pollers on one token fight over updates; defer to the
                // incumbent and report a normal exit.
                tracing::info!(pid, "another instance is already running, exiting");
                return Ok(());
            }
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        {
            let shutdown = Arc::clone(&shutdown);
            ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
                .context("installing signal handler")?;
        }

        let _keepalive =
            keepalive::spawn(config.port).map_err(|e| ExitError::Transport(e.to_string()))?;

        let storage = JsonFileStorage::new(&config.data_dir);
        let items = ItemStore::load(storage.clone())
            .map_err(|e| ExitError::Storage(e.to_string()))?;
        let subscribers = SubscriberRegistry::load(storage)
            .map_err(|e| ExitError::Storage(e.to_string()))?;

        let transport = TelegramTransport::new(&config.token);
        let mut bot = Bot::new(items, subscribers, transport.clone(), config.admins.clone());

        tracing::info!(
            items = bot.items().len(),
            subscribers = bot.subscribers().len(),
            admins = config.admins.len(),
            data_dir = %config.data_dir.display(),
            "serving"
        );

        let mut offset = 0i64;
        while !shutdown.load(Ordering::SeqCst) {
            let updates = match transport.fetch_updates(offset, POLL_WINDOW_SECS) {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "update poll failed");
                    std::thread::sleep(POLL_RETRY_DELAY);
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(callback_id) = update.callback_id() {
                    transport.answer_callback(callback_id);
                }
                let Some(inbound) = telegram::to_inbound(update) else {
                    continue;
                };
                // One update at a time; a bad one is logged and skipped so
                // the poll offset still advances past it.
                if let Err(e) = bot.handle(inbound) {
                    tracing::error!(error = %e, "update handling failed");
                }
            }
        }

        tracing::info!("shutdown requested, stopping");
        Ok(())
    }
}
