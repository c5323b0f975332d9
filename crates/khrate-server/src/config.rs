use std::path::PathBuf;
use std::time::Duration;

use khrate::ScraperSettings;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub chrome_executable: Option<PathBuf>,
    pub render_timeout: Duration,
    pub recipes_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_address = match var("BIND_ADDRESS") {
            Some(address) => address,
            None => {
                let port = match var("PORT") {
                    Some(port) => port.trim().parse::<u16>().map_err(|_| {
                        ConfigError::InvalidValue {
                            name: "PORT",
                            value: port.clone(),
                        }
                    })?,
                    None => DEFAULT_PORT,
                };
                format!("0.0.0.0:{port}")
            }
        };

        let render_timeout = match var("RENDER_TIMEOUT_SECS") {
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidValue {
                    name: "RENDER_TIMEOUT_SECS",
                    value: secs,
                })?,
            None => Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
        };

        Ok(Self {
            bind_address,
            chrome_executable: var("CHROME_EXECUTABLE_PATH").map(PathBuf::from),
            render_timeout,
            recipes_file: var("KHRATE_RECIPES").map(PathBuf::from),
        })
    }

    pub fn scraper_settings(&self) -> ScraperSettings {
        ScraperSettings {
            chrome_executable: self.chrome_executable.clone(),
            render_timeout: self.render_timeout,
        }
    }
}
