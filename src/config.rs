// Configuration management for the VPN route resolver
// Supports CLI arguments, config file (TOML), and environment variables

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::routes::link::DEFAULT_SYSFS_NET;

/// VPN route resolver - find the VPN server and tunnel gateway addresses in the kernel routing table
#[derive(Parser, Debug, Clone)]
#[command(name = "vpn-route-resolver")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, env = "VRR_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "VRR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, env = "VRR_FORMAT", global = true)]
    pub format: Option<OutputFormat>,

    /// Path to the iproute2 `ip` command
    #[arg(long, env = "VRR_IP_COMMAND", global = true)]
    pub ip_command: Option<PathBuf>,

    /// Directory listing network links (sysfs class/net)
    #[arg(long, env = "VRR_SYSFS_NET", global = true)]
    pub sysfs_net: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the public IP address of the VPN server
    Destination,

    /// Print the gateway IP address inside the VPN tunnel
    Gateway {
        /// Tunnel interface name (defaults to the configured interface)
        #[arg(short, long, env = "VRR_INTERFACE")]
        interface: Option<String>,
    },

    /// Dump the routing table snapshot the resolvers work on
    Routes,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// VPN settings
    #[serde(default)]
    pub vpn: VpnConfig,

    /// Where to read kernel state from
    #[serde(default)]
    pub system: SystemConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpnConfig {
    /// Tunnel interface name
    #[serde(default = "default_interface")]
    pub interface: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Path to the `ip` command
    #[serde(default = "default_ip_command")]
    pub ip_command: PathBuf,

    /// sysfs network class directory
    #[serde(default = "default_sysfs_net")]
    pub sysfs_net: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_interface() -> String {
    "tun0".to_string()
}
fn default_ip_command() -> PathBuf {
    PathBuf::from("ip")
}
fn default_sysfs_net() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_NET)
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for VpnConfig {
    fn default() -> Self {
        VpnConfig {
            interface: default_interface(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            ip_command: default_ip_command(),
            sysfs_net: default_sysfs_net(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// What the binary was asked to do, with the tunnel interface already resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Destination,
    Gateway { interface: String },
    Routes,
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub action: Action,
    pub log_level: Level,
    pub format: OutputFormat,
    pub ip_command: PathBuf,
    pub sysfs_net: PathBuf,
}

impl Config {
    /// Load configuration from all sources (CLI args, config file, defaults)
    /// Priority: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> anyhow::Result<Self> {
        let cli_args = CliArgs::parse();
        let config_file = load_config_file(cli_args.config.as_deref())?;
        Self::merge(cli_args, config_file)
    }

    fn merge(cli_args: CliArgs, config_file: ConfigFile) -> anyhow::Result<Self> {
        let action = match cli_args.command {
            Command::Destination => Action::Destination,
            Command::Gateway { interface } => Action::Gateway {
                interface: interface.unwrap_or(config_file.vpn.interface),
            },
            Command::Routes => Action::Routes,
        };

        let log_level = parse_log_level(cli_args.log_level.as_deref().unwrap_or(&config_file.logging.level))?;

        Ok(Config {
            action,
            log_level,
            format: cli_args.format.unwrap_or(config_file.output.format),
            ip_command: cli_args.ip_command.unwrap_or(config_file.system.ip_command),
            sysfs_net: cli_args.sysfs_net.unwrap_or(config_file.system.sysfs_net),
        })
    }
}

fn load_config_file(path: Option<&Path>) -> anyhow::Result<ConfigFile> {
    if let Some(config_path) = path {
        return read_config_file(config_path);
    }

    // Try loading from default locations
    let default_paths = [
        PathBuf::from("vpn-route-resolver.toml"),
        PathBuf::from("config.toml"),
    ];
    for path in default_paths {
        if path.exists() {
            return read_config_file(&path);
        }
    }

    Ok(ConfigFile::default())
}

fn read_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    // Logging is not set up yet; the file name shows up in errors instead
    let config_content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
    toml::from_str::<ConfigFile>(&config_content)
        .map_err(|e| anyhow::anyhow!("parsing {}: {}", path.display(), e))
}

fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}
