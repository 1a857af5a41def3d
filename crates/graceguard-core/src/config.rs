use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::GraceGuardError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub blocklist: BlocklistConfig,
    pub grace: GraceConfig,
    pub dns: DnsConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistConfig {
    pub hosts_path: PathBuf,
    pub sentinel_address: String,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraceConfig {
    /// Selectors that a grace activation unblocks and the timer re-blocks.
    pub guarded_domains: Vec<String>,
    /// Case-insensitive substrings; any hosts line containing one is removed on unblock.
    pub match_patterns: Vec<String>,
    pub duration_minutes: u64,
    pub max_activations: u32,
    pub window_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Command run after every hosts write; empty disables flushing.
    pub flush_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub shutdown_timeout_secs: u64,
    pub allowed_uids: Vec<u32>,
    /// Where the diagnostic hosts copy goes; the OS temp dir when unset.
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_path: PathBuf,
}

/// Upper bounds accepted by `Config::validate`.
pub const MAX_GRACE_MINUTES: u64 = 24 * 60;
pub const MAX_WINDOW_HOURS: u64 = 24 * 366;

const DEFAULT_BLOCKED_SITES: &[&str] = &[
    "youtube.com",
    "reddit.com",
    "4chan.org",
    "steampowered.com",
    "instagram.com",
    "x.com",
    "twitter.com",
    "facebook.com",
    "tiktok.com",
    "netflix.com",
    "hulu.com",
    "amazon.com",
    "ebay.com",
    "pinterest.com",
    "snapchat.com",
    "tumblr.com",
];

impl Config {
    pub fn default_config() -> Self {
        let mut domains = Vec::with_capacity(DEFAULT_BLOCKED_SITES.len() * 2);
        for site in DEFAULT_BLOCKED_SITES {
            domains.push(site.to_string());
            if *site == "steampowered.com" {
                domains.push(format!("store.{site}"));
            } else {
                domains.push(format!("www.{site}"));
            }
        }

        Self {
            blocklist: BlocklistConfig {
                hosts_path: default_hosts_path(),
                sentinel_address: "127.0.0.1".to_string(),
                domains,
            },
            grace: GraceConfig {
                guarded_domains: vec!["youtube.com".to_string(), "www.youtube.com".to_string()],
                match_patterns: vec!["youtube.com".to_string()],
                duration_minutes: 30,
                max_activations: 2,
                window_hours: 10,
            },
            dns: DnsConfig {
                flush_command: default_flush_command(),
            },
            daemon: DaemonConfig {
                shutdown_timeout_secs: 5,
                allowed_uids: Vec::new(),
                backup_dir: None,
            },
        }
    }

    /// Rejects configurations the access controller cannot honour.
    pub fn validate(&self) -> Result<(), GraceGuardError> {
        if self.blocklist.sentinel_address.trim().is_empty() {
            return Err(GraceGuardError::InvalidConfig(
                "blocklist.sentinel_address must not be empty".to_string(),
            ));
        }
        if self.blocklist.domains.is_empty() {
            return Err(GraceGuardError::InvalidConfig(
                "blocklist.domains must list at least one domain".to_string(),
            ));
        }
        if self.grace.guarded_domains.is_empty() {
            return Err(GraceGuardError::InvalidConfig(
                "grace.guarded_domains must list at least one domain".to_string(),
            ));
        }
        if self.grace.duration_minutes == 0 || self.grace.window_hours == 0 {
            return Err(GraceGuardError::InvalidConfig(
                "grace durations must be greater than zero".to_string(),
            ));
        }
        if self.grace.duration_minutes > MAX_GRACE_MINUTES {
            return Err(GraceGuardError::InvalidConfig(format!(
                "grace.duration_minutes must be at most {MAX_GRACE_MINUTES}"
            )));
        }
        if self.grace.window_hours > MAX_WINDOW_HOURS {
            return Err(GraceGuardError::InvalidConfig(format!(
                "grace.window_hours must be at most {MAX_WINDOW_HOURS}"
            )));
        }

        let patterns: Vec<String> = self
            .grace
            .match_patterns
            .iter()
            .map(|pattern| pattern.to_lowercase())
            .collect();
        for domain in &self.grace.guarded_domains {
            let domain = domain.to_lowercase();
            if !patterns.iter().any(|pattern| domain.contains(pattern.as_str())) {
                return Err(GraceGuardError::InvalidConfig(format!(
                    "guarded domain {domain} is not covered by any grace.match_patterns entry"
                )));
            }
        }
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let output = toml::to_string_pretty(self).context("render config TOML")?;
        Ok(output)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let contents = self.to_toml_string()?;
        fs::write(path, contents).with_context(|| format!("write config at {}", path.display()))?;
        Ok(())
    }

    /// Loads `path` if given, else the resolved default path, falling back to
    /// the built-in defaults when no config file exists yet.
    pub fn load_or_default(path: Option<&Path>, paths: &ConfigPaths) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if paths.config_path.exists() => Self::load(&paths.config_path),
            None => Ok(Self::default_config()),
        }
    }
}

impl ConfigPaths {
    pub fn resolve() -> Result<Self> {
        let project_dirs = ProjectDirs::from("io", "graceguard", "graceguard")
            .ok_or_else(|| anyhow::anyhow!("unable to determine project directories"))?;
        let config_path = match std::env::var("GRACEGUARD_CONFIG") {
            Ok(value) => PathBuf::from(value),
            Err(_) => project_dirs.config_dir().join("config.toml"),
        };
        Ok(Self { config_path })
    }
}

fn default_hosts_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

fn default_flush_command() -> Vec<String> {
    if cfg!(windows) {
        vec!["ipconfig".to_string(), "/flushdns".to_string()]
    } else if cfg!(target_os = "macos") {
        vec!["dscacheutil".to_string(), "-flushcache".to_string()]
    } else {
        vec!["resolvectl".to_string(), "flush-caches".to_string()]
    }
}
