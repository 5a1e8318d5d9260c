use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ExitError;
use crate::model::Identity;

/// Required bot token. The process refuses to start without it.
pub const TOKEN_ENV: &str = "CHECKPOST_TOKEN";
/// Comma-separated admin identities; overrides the config file.
pub const ADMINS_ENV: &str = "CHECKPOST_ADMINS";
/// Listen port for the keepalive endpoint (hosting platforms set `PORT`).
pub const PORT_ENV: &str = "PORT";
/// Storage directory override.
pub const DATA_DIR_ENV: &str = "CHECKPOST_DATA_DIR";

/// Optional config file next to the working directory.
pub const CONFIG_TOML: &str = "checkpost.toml";

/// Durable mount path preferred for storage when the platform provides one.
const DURABLE_DATA_DIR: &str = "/data";
const LOCAL_DATA_DIR: &str = "data";

const DEFAULT_PORT: u16 = 8000;

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub admins: Vec<Identity>,
    pub port: u16,
    pub data_dir: PathBuf,
}

/// Optional `checkpost.toml` contents. Everything here can also come from
/// the environment, which wins on conflict.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub admins: Vec<Identity>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn parse_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).map_err(|e| anyhow::anyhow!("invalid {CONFIG_TOML}: {e}"))
    }

    /// Load `checkpost.toml` from `dir` if present; absent is fine, a
    /// malformed file is a config error.
    pub fn find(dir: &Path) -> Result<Self, ExitError> {
        let path = dir.join(CONFIG_TOML);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                Self::parse_toml(&contents).map_err(|e| ExitError::Config(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ExitError::Config(format!(
                "reading {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Environment snapshot fed to [`resolve`], split out so tests don't have
/// to mutate the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub token: Option<String>,
    pub admins: Option<String>,
    pub port: Option<String>,
    pub data_dir: Option<String>,
}

impl EnvOverrides {
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            token: var(TOKEN_ENV),
            admins: var(ADMINS_ENV),
            port: var(PORT_ENV),
            data_dir: var(DATA_DIR_ENV),
        }
    }
}

impl Config {
    /// Load config from the process environment plus an optional
    /// `checkpost.toml` in the current directory. Fails fast when the
    /// token is missing.
    pub fn load() -> Result<Self, ExitError> {
        let dir = std::env::current_dir()
            .map_err(|e| ExitError::Config(format!("could not determine working dir: {e}")))?;
        let file = FileConfig::find(&dir)?;
        resolve(
            file,
            EnvOverrides::from_process(),
            Path::new(DURABLE_DATA_DIR).is_dir(),
        )
    }

    /// Storage directory resolution alone, for read-only commands that
    /// don't need a token.
    pub fn data_dir_only(cli_override: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = cli_override {
            return dir;
        }
        let env = EnvOverrides::from_process();
        if let Some(dir) = env.data_dir {
            return PathBuf::from(dir);
        }
        if Path::new(DURABLE_DATA_DIR).is_dir() {
            return PathBuf::from(DURABLE_DATA_DIR);
        }
        PathBuf::from(LOCAL_DATA_DIR)
    }
}

/// Merge the config file with environment overrides. `durable_mounted`
/// reports whether the platform's durable volume exists.
pub fn resolve(
    file: FileConfig,
    env: EnvOverrides,
    durable_mounted: bool,
) -> Result<Config, ExitError> {
    let token = env
        .token
        .ok_or_else(|| ExitError::Config(format!("{TOKEN_ENV} is not set")))?;

    let admins = match env.admins {
        Some(raw) => parse_admin_list(&raw)
            .map_err(|e| ExitError::Config(format!("{ADMINS_ENV}: {e}")))?,
        None => file.admins,
    };
    if admins.is_empty() {
        tracing::warn!("no admins configured, every mutation will be rejected");
    }

    let port = match env.port {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .map_err(|_| ExitError::Config(format!("{PORT_ENV} is not a valid port: {raw}")))?,
        None => file.port.unwrap_or(DEFAULT_PORT),
    };

    let data_dir = env
        .data_dir
        .map(PathBuf::from)
        .or(file.data_dir)
        .unwrap_or_else(|| {
            if durable_mounted {
                PathBuf::from(DURABLE_DATA_DIR)
            } else {
                PathBuf::from(LOCAL_DATA_DIR)
            }
        });

    Ok(Config {
        token,
        admins,
        port,
        data_dir,
    })
}

fn parse_admin_list(raw: &str) -> anyhow::Result<Vec<Identity>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<Identity>()
                .map_err(|_| anyhow::anyhow!("not a numeric identity: {part}"))
        })
        .collect()
}
