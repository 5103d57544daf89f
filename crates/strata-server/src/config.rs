use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub world: WorldSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_motd")]
    pub motd: String,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// Chebyshev radius of the chunk box streamed around each player.
    #[serde(default = "default_view_radius")]
    pub view_radius: i32,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
}

fn default_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    25565
}

fn default_motd() -> String {
    "A strata server".into()
}

fn default_max_players() -> u32 {
    20
}

fn default_view_radius() -> i32 {
    4
}

fn default_login_timeout() -> u64 {
    30
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            motd: default_motd(),
            max_players: default_max_players(),
            view_radius: default_view_radius(),
            login_timeout_secs: default_login_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WorldSection {
    #[serde(default = "default_world_directory")]
    pub directory: String,
    #[serde(default)]
    pub seed: i64,
    /// Auto-save interval in seconds. 0 = disabled.
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval: u64,
}

fn default_world_directory() -> String {
    "world".into()
}

fn default_auto_save_interval() -> u64 {
    300
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            directory: default_world_directory(),
            seed: 0,
            auto_save_interval: default_auto_save_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load the config file, falling back to defaults when it does not
    /// exist. The boolean reports whether a file was actually read.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, bool), ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok((toml::from_str(&contents)?, true)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((Self::default(), false)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            [server]
            address = "127.0.0.1"
            port = 25570
            motd = "Test Server"
            max_players = 8
            view_radius = 6
            login_timeout_secs = 10

            [world]
            directory = "testworld"
            seed = 12345
            auto_save_interval = 60

            [logging]
            level = "debug"
        "#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.address, "127.0.0.1");
        assert_eq!(config.server.port, 25570);
        assert_eq!(config.server.motd, "Test Server");
        assert_eq!(config.server.max_players, 8);
        assert_eq!(config.server.view_radius, 6);
        assert_eq!(config.server.login_timeout_secs, 10);
        assert_eq!(config.world.directory, "testworld");
        assert_eq!(config.world.seed, 12345);
        assert_eq!(config.world.auto_save_interval, 60);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.bind_addr(), "127.0.0.1:25570");
    }

    #[test]
    fn missing_sections_take_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 25565);
        assert_eq!(config.server.max_players, 20);
        assert_eq!(config.server.view_radius, 4);
        assert_eq!(config.world.directory, "world");
        assert_eq!(config.world.seed, 0);
        assert_eq!(config.world.auto_save_interval, 300);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [server]
            motd = "hello"
        "#,
        )
        .unwrap();
        assert_eq!(config.server.motd, "hello");
        assert_eq!(config.server.port, 25565);
    }

    #[test]
    fn missing_file_is_defaults_not_error() {
        let path = std::env::temp_dir().join(format!("strata-nope-{}.toml", rand::random::<u64>()));
        let (config, found) = ServerConfig::load_or_default(&path).unwrap();
        assert!(!found);
        assert_eq!(config.server.port, 25565);
    }
}
