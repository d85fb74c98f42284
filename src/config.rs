// tsmctl - multi-server command runner for IBM Spectrum Protect
// Copyright (C) 2025 tsmctl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Default port of the Operations Center web server.
pub const DEFAULT_PORT: u16 = 11090;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub servers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error(
        "Operations Center address, username and password are required; set them with `tsmctl configure ...`"
    )]
    MissingCredentials,
    #[error(
        "at least one TSM server is required; pass --server or configure a server list with `tsmctl configure --servers ...`"
    )]
    MissingServers,
}

/// Fully resolved settings for one invocation.
#[derive(Debug)]
pub struct EffectiveConfig {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub servers: Vec<String>,
}

impl EffectiveConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}:{}/oc", self.address, self.port)
    }
}

/// CLI-level overrides applied on top of the merged config files.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub servers: Option<Vec<String>>,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".tsmctl.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("TSMCTL_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("tsmctl").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

pub fn resolve(cwd: &Path, overrides: Overrides) -> Result<EffectiveConfig> {
    let mut merged = load(cwd)?;

    if let Some(address) = overrides.address {
        merged.address = Some(address);
    }
    if let Some(port) = overrides.port {
        merged.port = Some(port);
    }
    if let Some(username) = overrides.username {
        merged.username = Some(username);
    }
    if let Some(password) = overrides.password {
        merged.password = Some(password);
    }
    if let Some(servers) = overrides.servers {
        merged.servers = Some(servers);
    }

    let address = merged
        .address
        .ok_or(ConfigError::MissingCredentials)
        .map(|a| a.trim().to_string())?;
    let username = merged.username.ok_or(ConfigError::MissingCredentials)?;
    let password = merged.password.ok_or(ConfigError::MissingCredentials)?;
    let servers = merged.servers.unwrap_or_default();
    if servers.is_empty() {
        return Err(ConfigError::MissingServers.into());
    }

    Ok(EffectiveConfig {
        address,
        port: merged.port.unwrap_or(DEFAULT_PORT),
        username,
        password,
        servers,
    })
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn merge(user: Config, local: Config) -> Config {
    Config {
        address: local.address.or(user.address),
        port: local.port.or(user.port),
        username: local.username.or(user.username),
        password: local.password.or(user.password),
        servers: local.servers.or(user.servers),
    }
}
