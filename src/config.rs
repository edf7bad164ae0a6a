//! Reads `schoold.toml` (or `$SCHOOLD_CONFIG`) into a [Config]. Missing values
//! fall back to defaults with a warning; a missing file is not an error.
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "schoold.toml";
pub const DEFAULT_BCRYPT_COST: u32 = 12;
pub const DEFAULT_SCHOOL_DAYS: u32 = 30;
pub const DEFAULT_MIN_FACE_DATA_LEN: usize = 100;

#[derive(Deserialize, Debug, Default)]
struct ConfigTomlWorkspace {
    path: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ConfigTomlAuth {
    bcrypt_cost: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
struct ConfigTomlAttendance {
    school_days: Option<u32>,
    min_face_data_len: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
struct ConfigToml {
    workspace: Option<ConfigTomlWorkspace>,
    auth: Option<ConfigTomlAuth>,
    attendance: Option<ConfigTomlAttendance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Workspace opened at startup, if any.
    pub workspace: Option<PathBuf>,
    pub bcrypt_cost: u32,
    /// Days in a reporting period; attendance percentages are relative to it.
    pub school_days: u32,
    pub min_face_data_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            school_days: DEFAULT_SCHOOL_DAYS,
            min_face_data_len: DEFAULT_MIN_FACE_DATA_LEN,
        }
    }
}

/// Loads the config from `$SCHOOLD_CONFIG` or [DEFAULT_CONFIG_FILE], then
/// applies `$SCHOOLD_WORKSPACE`.
pub fn get_config() -> Config {
    let location = std::env::var("SCHOOLD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
    let mut config = Config::load(Path::new(&location));
    if let Ok(ws) = std::env::var("SCHOOLD_WORKSPACE") {
        if !ws.trim().is_empty() {
            config.workspace = Some(PathBuf::from(ws));
        }
    }
    config
}

impl Config {
    pub fn load(location: &Path) -> Self {
        match std::fs::read_to_string(location) {
            Ok(content) => Self::from_toml_str(&content),
            Err(_) => {
                warn!(
                    "Configuration setup: {} not found, using defaults.",
                    location.to_string_lossy()
                );
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Self {
        let parsed: ConfigToml = toml::from_str(content).unwrap_or_else(|e| {
            warn!("Configuration setup: failed to parse config file ({e}), using defaults.");
            ConfigToml::default()
        });

        let workspace = parsed
            .workspace
            .and_then(|w| w.path)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let auth = parsed.auth.unwrap_or_default();
        let bcrypt_cost = match auth.bcrypt_cost {
            Some(c) if (4..=31).contains(&c) => c,
            Some(c) => {
                warn!("Configuration setup: auth.bcrypt_cost {c} out of range 4..=31.");
                DEFAULT_BCRYPT_COST
            }
            None => DEFAULT_BCRYPT_COST,
        };

        let attendance = parsed.attendance.unwrap_or_default();
        let school_days = attendance.school_days.unwrap_or(DEFAULT_SCHOOL_DAYS);
        let min_face_data_len = attendance
            .min_face_data_len
            .unwrap_or(DEFAULT_MIN_FACE_DATA_LEN);

        Self {
            workspace,
            bcrypt_cost,
            school_days,
            min_face_data_len,
        }
    }
}
