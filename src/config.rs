// src/config.rs
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command-line arguments for the application.
#[derive(Parser, Debug, Deserialize, Default)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Verbose mode variable
    #[clap(short = 'v', long, value_parser, help = "Verbose mode variable")]
    pub verbose_var: Option<String>,

    /// Trigger variable
    #[clap(short = 't', long, value_parser, help = "Trigger variable")]
    pub trigger_var: Option<String>,

    /// Transmission rate variable (seconds)
    #[clap(short = 'r', long, value_parser, help = "Transmission rate variable (seconds)")]
    pub rate_var: Option<String>,

    /// Template file
    #[clap(short = 'f', long, value_parser, help = "Template file")]
    pub template: Option<PathBuf>,

    /// Enable/disable variable
    #[clap(short = 'e', long, value_parser, help = "Enable/disable variable")]
    pub enable_var: Option<String>,

    /// Interface allow-list variable
    #[clap(short = 'i', long, value_parser, help = "Interface allow-list variable")]
    pub interface_var: Option<String>,

    /// Broadcast port variable
    #[clap(short = 'p', long, value_parser, help = "Broadcast port variable")]
    pub port_var: Option<String>,

    /// Metrics variable
    #[clap(short = 'm', long, value_parser, help = "Metrics variable")]
    pub metrics_var: Option<String>,

    /// Variable receiving each interface's address before rendering
    #[clap(long, value_parser, help = "Variable receiving each interface's address before rendering")]
    pub ip_var: Option<String>,

    /// HTTP address of the variable control surface (empty to disable)
    #[clap(
        long,
        value_parser,
        help = "HTTP address of the variable control surface (e.g., \"127.0.0.1:8790\", empty to disable)"
    )]
    pub control_addr: Option<String>,

    /// Path to a configuration file (e.g., udpt.toml)
    #[clap(
        short,
        long,
        value_parser,
        help = "Path to a configuration file (e.g., udpt.toml)"
    )]
    pub config: Option<PathBuf>,

    /// Log level (e.g., trace, debug, info, warn, error)
    #[clap(
        long,
        value_parser,
        help = "Log level (e.g., trace, debug, info, warn, error)"
    )]
    pub log_level: Option<String>,
}

/// Configuration loaded from file, environment, or defaults.
#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_var: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_var: Option<String>,
    /// Template file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Initial verbose flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
    /// Initial enable flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    /// Initial transmission rate in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,
    /// Initial broadcast port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Initial interface allow-list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<String>,
}

impl FileConfig {
    /// The lowest-precedence layer.
    pub fn defaults() -> Self {
        let names = VarNames::default();
        let seeds = Seeds::default();
        FileConfig {
            verbose_var: Some(names.verbose),
            trigger_var: Some(names.trigger),
            rate_var: Some(names.rate),
            enable_var: Some(names.enable),
            interface_var: Some(names.interfaces),
            port_var: Some(names.port),
            metrics_var: Some(names.metrics),
            ip_var: Some(names.ip),
            template: Some(PathBuf::from(DEFAULT_TEMPLATE)),
            control_addr: Some(DEFAULT_CONTROL_ADDR.to_string()),
            log_level: Some("info".to_string()),
            verbose: Some(seeds.verbose),
            enable: Some(seeds.enable),
            rate: Some(seeds.rate),
            port: Some(seeds.port),
            interfaces: Some(seeds.interfaces),
        }
    }
}

pub const DEFAULT_TEMPLATE: &str = "udpt.tmpl";
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:8790";

/// Names of the variables the engine registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarNames {
    pub verbose: String,
    pub trigger: String,
    pub rate: String,
    pub enable: String,
    pub interfaces: String,
    pub port: String,
    pub metrics: String,
    pub ip: String,
}

impl Default for VarNames {
    fn default() -> Self {
        Self {
            verbose: "/sys/udpt/verbose".to_string(),
            trigger: "/sys/udpt/trigger".to_string(),
            rate: "/sys/udpt/txrate".to_string(),
            enable: "/sys/udpt/enable".to_string(),
            interfaces: "/sys/udpt/interfaces".to_string(),
            port: "/sys/udpt/port".to_string(),
            metrics: "/sys/udpt/metrics".to_string(),
            ip: "/sys/udpt/ip".to_string(),
        }
    }
}

/// Values given to variables this process creates itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seeds {
    pub verbose: bool,
    pub enable: bool,
    pub rate: u32,
    pub port: u16,
    pub interfaces: String,
}

impl Default for Seeds {
    fn default() -> Self {
        Self {
            verbose: false,
            enable: false,
            rate: 0,
            port: 9999,
            interfaces: String::new(),
        }
    }
}

/// Final application configuration after merging all sources.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vars: VarNames,
    pub template: PathBuf,
    /// Control surface address; `None` disables it.
    pub control_addr: Option<String>,
    pub log_level: String,
    pub seeds: Seeds,
}

impl AppConfig {
    /// Loads the application configuration by merging CLI, file, environment, and defaults.
    pub fn load() -> Result<Self, figment::Error> {
        let cli_args = CliArgs::parse();
        let config_file_path = cli_args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("udpt.toml"));

        let fig = Figment::new()
            .merge(Serialized::defaults(FileConfig::defaults()))
            .merge(Toml::file(config_file_path).nested())
            .merge(Env::prefixed("UDPT_").global());

        Self::from_figment(fig, cli_args)
    }

    /// Resolves the merged figment (profile `udpt`) and applies CLI overrides on top.
    pub fn from_figment(fig: Figment, cli_args: CliArgs) -> Result<Self, figment::Error> {
        let merged: FileConfig = fig.select("udpt").extract()?;
        let names = VarNames::default();
        let seeds = Seeds::default();

        let pick = |cli: Option<String>, file: Option<String>, default: String| cli.or(file).unwrap_or(default);

        let vars = VarNames {
            verbose: pick(cli_args.verbose_var, merged.verbose_var, names.verbose),
            trigger: pick(cli_args.trigger_var, merged.trigger_var, names.trigger),
            rate: pick(cli_args.rate_var, merged.rate_var, names.rate),
            enable: pick(cli_args.enable_var, merged.enable_var, names.enable),
            interfaces: pick(cli_args.interface_var, merged.interface_var, names.interfaces),
            port: pick(cli_args.port_var, merged.port_var, names.port),
            metrics: pick(cli_args.metrics_var, merged.metrics_var, names.metrics),
            ip: pick(cli_args.ip_var, merged.ip_var, names.ip),
        };

        let control_addr = cli_args
            .control_addr
            .or(merged.control_addr)
            .unwrap_or_else(|| DEFAULT_CONTROL_ADDR.to_string());
        let control_addr = Some(control_addr).filter(|addr| !addr.trim().is_empty());

        Ok(AppConfig {
            vars,
            template: cli_args
                .template
                .or(merged.template)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE)),
            control_addr,
            log_level: cli_args
                .log_level
                .or(merged.log_level)
                .unwrap_or_else(|| "info".to_string()),
            seeds: Seeds {
                verbose: merged.verbose.unwrap_or(seeds.verbose),
                enable: merged.enable.unwrap_or(seeds.enable),
                rate: merged.rate.unwrap_or(seeds.rate),
                port: merged.port.unwrap_or(seeds.port),
                interfaces: merged.interfaces.unwrap_or(seeds.interfaces),
            },
        })
    }
}
