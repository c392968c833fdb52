use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct TraplistConfig {
    pub api_port: u16,
    pub paths: TraplistPaths,
    pub limits: RateLimitConfig,
    pub default_page_size: usize,
}

impl TraplistConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("TRAPLIST_HOME") {
            Ok(raw) if !raw.trim().is_empty() => TraplistPaths::from_base_dir(raw.trim())?,
            _ => TraplistPaths::discover()?,
        };
        let api_port = env::var("TRAPLIST_API_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(8080);
        let default_page_size = env::var("TRAPLIST_DEFAULT_PAGE_SIZE")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(20)
            .min(MAX_PAGE_SIZE);
        Ok(Self {
            api_port,
            paths,
            limits: RateLimitConfig::from_env(),
            default_page_size,
        })
    }

    pub fn new(api_port: u16, paths: TraplistPaths) -> Self {
        Self {
            api_port,
            paths,
            limits: RateLimitConfig::default(),
            default_page_size: 20,
        }
    }
}

/// A `count` per `window_seconds` budget for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionLimit {
    pub limit: u32,
    pub window_seconds: u64,
}

impl ActionLimit {
    pub const fn new(limit: u32, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds,
        }
    }

    /// Parses the `count/seconds` form used by the `TRAPLIST_LIMIT_*` variables.
    pub fn parse(raw: &str) -> Option<Self> {
        let (count, seconds) = raw.trim().split_once('/')?;
        let limit = count.trim().parse::<u32>().ok()?;
        let window_seconds = seconds.trim().parse::<u64>().ok()?;
        if limit == 0 || window_seconds == 0 {
            return None;
        }
        Some(Self::new(limit, window_seconds))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub add_comment: ActionLimit,
    pub edit_comment: ActionLimit,
    pub delete_comment: ActionLimit,
    pub set_vote: ActionLimit,
    pub set_rating: ActionLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            add_comment: ActionLimit::new(10, 60),
            edit_comment: ActionLimit::new(20, 60),
            delete_comment: ActionLimit::new(20, 60),
            set_vote: ActionLimit::new(60, 60),
            set_rating: ActionLimit::new(30, 60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |name: &str, fallback: ActionLimit| {
            env::var(name)
                .ok()
                .and_then(|raw| ActionLimit::parse(&raw))
                .unwrap_or(fallback)
        };
        Self {
            add_comment: read("TRAPLIST_LIMIT_ADD_COMMENT", defaults.add_comment),
            edit_comment: read("TRAPLIST_LIMIT_EDIT_COMMENT", defaults.edit_comment),
            delete_comment: read("TRAPLIST_LIMIT_DELETE_COMMENT", defaults.delete_comment),
            set_vote: read("TRAPLIST_LIMIT_SET_VOTE", defaults.set_vote),
            set_rating: read("TRAPLIST_LIMIT_SET_RATING", defaults.set_rating),
        }
    }

    /// Effectively disables limiting; handy for tests that hammer one user.
    pub fn unlimited() -> Self {
        let wide = ActionLimit::new(u32::MAX, 60);
        Self {
            add_comment: wide,
            edit_comment: wide,
            delete_comment: wide,
            set_vote: wide,
            set_rating: wide,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TraplistPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub logs_dir: PathBuf,
}

impl TraplistPaths {
    pub fn discover() -> Result<Self> {
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("traplist.db");
        let logs_dir = base.join("logs");

        Ok(Self {
            base,
            data_dir,
            db_path,
            logs_dir,
        })
    }
}
