use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Args;
use serde::{Deserialize, Serialize};

use super::doctor::OutputFormat;
use crate::config::Config;
use crate::error::ExitError;
use crate::storage::JsonFileStorage;
use crate::store::items::ItemStore;
use crate::store::subscribers::SubscriberRegistry;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Storage directory (defaults to the resolved data dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReport {
    pub data_dir: String,
    pub items: Vec<ItemLine>,
    pub subscribers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemLine {
    pub name: String,
    pub status: String,
    pub updated: Option<String>,
}

impl StatusArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let format = self.format.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                OutputFormat::Pretty
            } else {
                OutputFormat::Text
            }
        });

        let data_dir = Config::data_dir_only(self.data_dir.clone());
        let storage = JsonFileStorage::new(&data_dir);
        let items =
            ItemStore::load(storage.clone()).map_err(|e| ExitError::Storage(e.to_string()))?;
        let subscribers =
            SubscriberRegistry::load(storage).map_err(|e| ExitError::Storage(e.to_string()))?;

        let report = StatusReport {
            data_dir: data_dir.display().to_string(),
            items: items
                .iter()
                .map(|(name, item)| ItemLine {
                    name: name.to_string(),
                    status: item.status.as_str().to_string(),
                    updated: item.updated.clone(),
                })
                .collect(),
            subscribers: subscribers.len(),
        };

        match format {
            OutputFormat::Pretty => print_pretty(&report),
            OutputFormat::Text => print_text(&report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }

        Ok(())
    }
}

fn print_pretty(report: &StatusReport) {
    println!("=== Checkpost Status ===\n");
    println!("Data dir: {}", report.data_dir);
    println!("\nCheckpoints:");
    for item in &report.items {
        match &item.updated {
            Some(stamp) => println!("  {} — {} ({stamp})", item.name, item.status),
            None => println!("  {} — {}", item.name, item.status),
        }
    }
    println!("\nSubscribers: {}", report.subscribers);
}

fn print_text(report: &StatusReport) {
    println!("checkpost-status");
    println!("data-dir  {}", report.data_dir);
    for item in &report.items {
        println!(
            "item  name={}  status={}  updated={}",
            item.name,
            item.status,
            item.updated.as_deref().unwrap_or("-")
        );
    }
    println!("subscribers  count={}", report.subscribers);
}
