use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::cg::{COINGECKO_API_URL, MAX_PER_PAGE};

pub const ENV_PREFIX: &str = "PRICE_RELAY";
const DEFAULT_CONFIG_NAME: &str = "price-relay";

/// Runtime settings, layered as defaults < config file < `PRICE_RELAY_*` env.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub host: String,
    pub port: u16,
    pub max_per_page: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: COINGECKO_API_URL.to_owned(),
            request_timeout_secs: 10,
            host: "127.0.0.1".to_owned(),
            port: 3000,
            max_per_page: MAX_PER_PAGE,
        }
    }
}

impl Settings {
    /// Reads `price-relay.{toml,json}` from the working directory when
    /// `path` is `None`; an explicit `path` must exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = Settings::default();
        let mut cfg = Config::default();
        cfg.set_default("api_base_url", defaults.api_base_url)?;
        cfg.set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?;
        cfg.set_default("host", defaults.host)?;
        cfg.set_default("port", defaults.port as i64)?;
        cfg.set_default("max_per_page", defaults.max_per_page as i64)?;
        match path {
            Some(path) => cfg
                .merge(File::with_name(path).required(true))
                .with_context(|| format!("Reading config file {}", path))?,
            None => cfg.merge(File::with_name(DEFAULT_CONFIG_NAME).required(false))?,
        };
        cfg.merge(Environment::with_prefix(ENV_PREFIX))?;
        let settings: Settings = cfg.try_into().context("Parsing settings")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.request_timeout_secs > 0,
            "request_timeout_secs must be positive"
        );
        ensure!(self.max_per_page > 0, "max_per_page must be positive");
        ensure!(!self.api_base_url.is_empty(), "api_base_url must be set");
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid host address {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
