use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::config::{self, Config, EnvOverrides, FileConfig};

#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Storage directory to check instead of the resolved default
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoctorReport {
    pub token_set: bool,
    pub admins_configured: usize,
    pub port: Option<u16>,
    pub config_file: FileCheck,
    pub storage: StorageCheck,
    pub issues: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileCheck {
    pub path: String,
    pub exists: bool,
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageCheck {
    pub data_dir: String,
    pub writable: bool,
}

impl DoctorArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let format = self.format.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                OutputFormat::Pretty
            } else {
                OutputFormat::Text
            }
        });

        let env = EnvOverrides::from_process();
        let mut issues = vec![];

        let token_set = env.token.is_some();
        if !token_set {
            issues.push(format!("{} is not set", config::TOKEN_ENV));
        }

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let config_path = cwd.join(config::CONFIG_TOML);
        let exists = config_path.exists();
        let (file, valid) = match FileConfig::find(&cwd) {
            Ok(file) => (file, true),
            Err(e) => {
                issues.push(e.to_string());
                (FileConfig::default(), false)
            }
        };
        let config_file = FileCheck {
            path: config_path.display().to_string(),
            exists,
            valid: exists && valid,
        };

        let admins_configured = match env.admins.as_deref() {
            Some(raw) => raw.split(',').filter(|s| !s.trim().is_empty()).count(),
            None => file.admins.len(),
        };
        if admins_configured == 0 {
            issues.push("no admins configured, every mutation will be rejected".to_string());
        }

        let port = match env.port.as_deref() {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => Some(port),
                Err(_) => {
                    issues.push(format!("{} is not a valid port: {raw}", config::PORT_ENV));
                    None
                }
            },
            None => Some(file.port.unwrap_or(8000)),
        };

        let data_dir = Config::data_dir_only(self.data_dir.clone());
        let writable = probe_writable(&data_dir);
        if !writable {
            issues.push(format!("data dir {} is not writable", data_dir.display()));
        }
        let storage = StorageCheck {
            data_dir: data_dir.display().to_string(),
            writable,
        };

        let report = DoctorReport {
            token_set,
            admins_configured,
            port,
            config_file,
            storage,
            issues,
        };

        match format {
            OutputFormat::Pretty => print_pretty(&report),
            OutputFormat::Text => print_text(&report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }

        if report.issues.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("doctor found {} issue(s)", report.issues.len())
        }
    }
}

fn probe_writable(dir: &std::path::Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".doctor-probe");
    let ok = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

fn print_pretty(report: &DoctorReport) {
    println!("=== Checkpost Doctor ===\n");
    println!("Token: {}", if report.token_set { "set" } else { "MISSING" });
    println!("Admins: {}", report.admins_configured);
    match report.port {
        Some(port) => println!("Port: {port}"),
        None => println!("Port: invalid"),
    }
    println!(
        "Config file: {} ({})",
        report.config_file.path,
        if !report.config_file.exists {
            "absent, defaults apply"
        } else if report.config_file.valid {
            "ok"
        } else {
            "INVALID"
        }
    );
    println!(
        "Storage: {} ({})",
        report.storage.data_dir,
        if report.storage.writable { "writable" } else { "NOT WRITABLE" }
    );

    if report.issues.is_empty() {
        println!("\nNo issues found.");
    } else {
        println!("\nIssues:");
        for issue in &report.issues {
            println!("  • {issue}");
        }
    }
}

fn print_text(report: &DoctorReport) {
    println!("checkpost-doctor");
    println!("token  set={}", report.token_set);
    println!("admins  count={}", report.admins_configured);
    match report.port {
        Some(port) => println!("port  value={port}"),
        None => println!("port  value=invalid"),
    }
    println!(
        "config-file  path={}  exists={}  valid={}",
        report.config_file.path, report.config_file.exists, report.config_file.valid
    );
    println!(
        "storage  data-dir={}  writable={}",
        report.storage.data_dir, report.storage.writable
    );
    for issue in &report.issues {
        println!("issue  {issue}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_accepts_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(probe_writable(&dir.path().join("nested")));
    }

    #[test]
    fn probe_leaves_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        assert!(probe_writable(dir.path()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
