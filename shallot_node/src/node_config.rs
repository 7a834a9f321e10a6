use std::collections::HashMap;
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Error};
use clap::{Arg, ArgMatches, Command, ValueEnum, builder::PossibleValue, value_parser};
use config::{Config, File as CfgFile, FileFormat as CfgFileFormat};
use serde::{de, Deserialize, Deserializer};
use serde_yaml::Value;
use shallot::core::config::Config as ProtocolConfig;

/// Config for threading.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum Threads {
    /// Detect number of threads automatically by the number of CPU cores.
    Auto,
    /// Exact number of threads.
    N(u16)
}

impl FromStr for Threads {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            Ok(Threads::Auto)
        } else {
            u16::from_str(s).map(Threads::N)
        }
    }
}

/// Specifies where to write logs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum LogType {
    Stderr,
    Stdout,
    #[cfg(unix)]
    Syslog,
    None,
}

impl ValueEnum for LogType {
    fn value_variants<'a>() -> &'a [Self] {
        use self::LogType::*;
        #[cfg(unix)]
        return &[Stderr, Stdout, Syslog, None];
        #[cfg(not(unix))]
        return &[Stderr, Stdout, None];
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        use self::LogType::*;
        Some(match self {
            Stderr => PossibleValue::new("Stderr"),
            Stdout => PossibleValue::new("Stdout"),
            #[cfg(unix)]
            Syslog => PossibleValue::new("Syslog"),
            None => PossibleValue::new("None")
        })
    }
}

fn de_threads<'de, D>(deserializer: D) -> Result<Threads, D::Error> where D: Deserializer<'de> {
    let s = String::deserialize(deserializer)?;

    Threads::from_str(&s)
        .map_err(|e| de::Error::custom(format!("threads: {:?}", e)))
}

/// Config parsed from command line arguments or from a config file.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// Number of nodes in the simulated network
    pub nodes: usize,
    /// Number of random waypoints in a circuit
    #[serde(rename = "route-length")]
    pub route_length: usize,
    /// Timeout of a single call between nodes in milliseconds
    #[serde(rename = "call-timeout")]
    pub call_timeout: u64,
    /// How many times a timed out call is repeated
    #[serde(rename = "max-call-retries")]
    pub max_call_retries: u32,
    /// Maximum number of cached identities per node
    #[serde(rename = "identity-cache-size")]
    pub identity_cache_size: usize,
    /// Messages to send through the circuit
    #[serde(default)]
    pub messages: Vec<String>,
    /// Number of threads for execution.
    #[serde(deserialize_with = "de_threads")]
    pub threads: Threads,
    /// Specifies where to write logs.
    #[serde(rename = "log-type")]
    pub log_type: LogType,
    /// Unused fields while parsing config file
    #[serde(flatten)]
    pub unused: HashMap<String, Value>,
}

impl NodeConfig {
    /// Settings every simulated node runs with.
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            route_length: self.route_length,
            call_timeout: Duration::from_millis(self.call_timeout),
            max_call_retries: self.max_call_retries,
            identity_cache_size: self.identity_cache_size,
        }
    }
}

fn app() -> Command {
    Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .args_conflicts_with_subcommands(true)
        .subcommand(Command::new("config")
            .arg(Arg::new("cfg-file")
                .index(1)
                .help("Load settings from saved config file. \
                    Config file format is YAML")
                .num_args(1)
                .required(true)))
        // here go args without subcommands
        .arg(Arg::new("nodes")
            .short('n')
            .long("nodes")
            .help("Number of nodes in the simulated network")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("8"))
        .arg(Arg::new("route-length")
            .short('r')
            .long("route-length")
            .help("Number of random waypoints before the destination")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("3"))
        .arg(Arg::new("call-timeout")
            .long("call-timeout")
            .help("Timeout of a single call between nodes in milliseconds")
            .num_args(1)
            .value_parser(value_parser!(u64))
            .default_value("666"))
        .arg(Arg::new("max-call-retries")
            .long("max-call-retries")
            .help("How many times a timed out call is repeated")
            .num_args(1)
            .value_parser(value_parser!(u32))
            .default_value("3"))
        .arg(Arg::new("identity-cache-size")
            .long("identity-cache-size")
            .help("Maximum number of cached identities per node")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("1024"))
        .arg(Arg::new("message")
            .short('m')
            .long("message")
            .help("Message to send through the circuit. May be repeated")
            .num_args(1)
            .action(clap::ArgAction::Append))
        .arg(Arg::new("threads")
            .short('j')
            .long("threads")
            .help("Number of threads to use. The value 'auto' means that the \
                   number of threads will be determined automatically by the \
                   number of CPU cores")
            .num_args(1)
            .value_parser(value_parser!(Threads))
            .default_value("1"))
        .arg(Arg::new("log-type")
            .short('l')
            .long("log-type")
            .help("Where to write logs")
            .num_args(1)
            .value_parser(value_parser!(LogType))
            .default_value("Stderr"))
}

/// Parse command line arguments.
pub fn cli_parse() -> Result<NodeConfig, Error> {
    let matches = app().get_matches();

    match matches.subcommand() {
        Some(("config", m)) => run_config(m),
        _ => Ok(run_args(&matches)),
    }
}

/// Parse settings from a saved file.
fn parse_config(config_path: &str) -> Result<NodeConfig, Error> {
    let config_file = Config::builder()
        .set_default("nodes", 8)?
        .set_default("route-length", 3)?
        .set_default("call-timeout", 666)?
        .set_default("max-call-retries", 3)?
        .set_default("identity-cache-size", 1024)?
        .set_default("threads", "1")?
        .set_default("log-type", "Stderr")?
        .add_source(CfgFile::new(config_path, CfgFileFormat::Yaml))
        .build()
        .with_context(|| format!("Can't build config file {}", config_path))?;

    let mut config: NodeConfig = config_file.try_deserialize()
        .context("Can't deserialize config")?;
    if config.messages.is_empty() {
        config.messages.push(DEFAULT_MESSAGE.to_owned());
    }

    Ok(config)
}

/// Message sent when none is configured.
const DEFAULT_MESSAGE: &str = "hello";

fn run_config(matches: &ArgMatches) -> Result<NodeConfig, Error> {
    let config_path = matches.get_one::<String>("cfg-file")
        .context("Config file is not specified")?;

    parse_config(config_path)
}

fn run_args(matches: &ArgMatches) -> NodeConfig {
    let nodes = matches.get_one("nodes").copied().unwrap_or(8);

    let route_length = matches.get_one("route-length").copied().unwrap_or(3);

    let call_timeout = matches.get_one("call-timeout").copied().unwrap_or(666);

    let max_call_retries = matches.get_one("max-call-retries").copied().unwrap_or(3);

    let identity_cache_size = matches.get_one("identity-cache-size").copied().unwrap_or(1024);

    let mut messages: Vec<String> = matches.get_many("message").unwrap_or_default().cloned().collect();
    if messages.is_empty() {
        messages.push(DEFAULT_MESSAGE.to_owned());
    }

    let threads = matches.get_one("threads").copied().unwrap_or(Threads::N(1));

    let log_type = matches.get_one("log-type").copied().unwrap_or(LogType::Stderr);

    NodeConfig {
        nodes,
        route_length,
        call_timeout,
        max_call_retries,
        identity_cache_size,
        messages,
        threads,
        log_type,
        unused: HashMap::new(),
    }
}
