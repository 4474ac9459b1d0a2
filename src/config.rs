//! Server configuration: parsed from a Redis-style `key value` config file
//! via `kv_config_parser`, then overridden by `--key value` CLI flags.
use crate::error::Error;
use serde::Deserialize;
use serde_enum_str::Deserialize_enum_str;
use std::{fs, net::IpAddr, path::PathBuf};
use strum_macros::Display;

#[derive(Deserialize_enum_str, Debug, Clone, Copy, PartialEq, Display)]
pub enum AppendFsync {
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "everysec")]
    EverySecond,
    #[serde(other, rename = "no")]
    No,
}

impl Default for AppendFsync {
    fn default() -> Self {
        Self::EverySecond
    }
}

#[derive(Deserialize_enum_str, Debug, Clone, Copy, PartialEq, Display)]
pub enum LogLevel {
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "verbose")]
    Verbose,
    #[serde(rename = "notice")]
    Notice,
    #[serde(other, rename = "warning")]
    Warning,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Notice
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Verbose => log::LevelFilter::Info,
            LogLevel::Notice => log::LevelFilter::Warn,
            LogLevel::Warning => log::LevelFilter::Warn,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Log {
    #[serde(rename = "loglevel")]
    pub level: LogLevel,
    #[serde(rename = "logfile")]
    pub file: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Tls {
    #[serde(rename = "tls-cert-file", default)]
    pub cert_file: String,
    #[serde(rename = "tls-key-file", default)]
    pub key_file: String,
    #[serde(rename = "tls-ca-cert-file", default)]
    pub ca_cert_file: String,
    #[serde(rename = "tls-client-cert-required", default)]
    pub client_cert_required: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(rename = "appendonly", default)]
    pub aof_enabled: bool,
    #[serde(rename = "appendfilename", default = "default_aof_file")]
    pub aof_file: String,
    #[serde(rename = "appendfsync", default)]
    pub aof_fsync: AppendFsync,

    #[serde(rename = "rdb-enabled", default = "default_true")]
    pub rdb_enabled: bool,
    #[serde(rename = "dbfilename", default = "default_rdb_file")]
    pub rdb_file: String,
    #[serde(rename = "save", default)]
    pub save_rules: Vec<u64>,

    #[serde(default)]
    pub requirepass: String,

    #[serde(flatten)]
    pub tls: Tls,

    #[serde(rename = "replicaof", default)]
    pub replicaof: Vec<String>,

    #[serde(rename = "maxmemory", default)]
    pub max_memory: u64,
    #[serde(rename = "maxclients", default = "default_max_clients")]
    pub max_clients: u32,

    #[serde(default = "default_stripes")]
    pub stripes: usize,
    #[serde(rename = "vector-dim", default = "default_vector_dim")]
    pub vector_dim: usize,

    #[serde(flatten)]
    pub log: Log,
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}
fn default_port() -> u16 {
    6399
}
fn default_aof_file() -> String {
    "appendonly.aof".to_owned()
}
fn default_rdb_file() -> String {
    "dump.rdb".to_owned()
}
fn default_true() -> bool {
    true
}
fn default_max_clients() -> u32 {
    10_000
}
fn default_stripes() -> usize {
    crate::db::DEFAULT_STRIPES
}
fn default_vector_dim() -> usize {
    crate::db::DEFAULT_VECTOR_DIM
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            aof_enabled: false,
            aof_file: default_aof_file(),
            aof_fsync: AppendFsync::default(),
            rdb_enabled: true,
            rdb_file: default_rdb_file(),
            save_rules: Vec::new(),
            requirepass: String::new(),
            tls: Tls::default(),
            replicaof: Vec::new(),
            max_memory: 0,
            max_clients: default_max_clients(),
            stripes: default_stripes(),
            vector_dim: default_vector_dim(),
            log: Log::default(),
        }
    }
}

impl Config {
    /// Loads a config file, then applies `--key value` CLI overrides on top.
    pub fn load(path: Option<&PathBuf>, cli_overrides: &[(String, String)]) -> Result<Self, Error> {
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
                kv_config_parser::de::from_str(&contents)
                    .map_err(|e| Error::Config(format!("{:?}", e)))?
            }
            None => Config::default(),
        };
        for (key, value) in cli_overrides {
            config.apply_override(key, value)?;
        }
        Ok(config)
    }

    fn apply_override(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let parse_u64 = |v: &str| v.parse::<u64>().map_err(|_| Error::Config(format!("invalid value for {}", key)));
        match key {
            "host" => self.host = value.to_owned(),
            "port" => self.port = value.parse().map_err(|_| Error::Config("invalid port".into()))?,
            "appendonly" => self.aof_enabled = matches!(value, "yes" | "true"),
            "appendfilename" => self.aof_file = value.to_owned(),
            "requirepass" => self.requirepass = value.to_owned(),
            "maxmemory" => self.max_memory = parse_u64(value)?,
            "maxclients" => self.max_clients = value.parse().map_err(|_| Error::Config("invalid maxclients".into()))?,
            "stripes" => self.stripes = value.parse().map_err(|_| Error::Config("invalid stripes".into()))?,
            "vector-dim" => self.vector_dim = value.parse().map_err(|_| Error::Config("invalid vector-dim".into()))?,
            "replicaof" => self.replicaof = value.split_whitespace().map(String::from).collect(),
            other => return Err(Error::Config(format!("unknown override key '{}'", other))),
        }
        Ok(())
    }

    /// `(changes, seconds)` save triggers, built by pairing up the `save`
    /// directive's `seconds changes seconds changes ...` arguments.
    pub fn save_trigger_pairs(&self) -> Vec<(u64, u64)> {
        self.save_rules
            .chunks(2)
            .filter_map(|c| match c {
                [seconds, changes] => Some((*changes, *seconds)),
                _ => None,
            })
            .collect()
    }

    pub fn replica_of(&self) -> Option<(String, u16)> {
        match self.replicaof.as_slice() {
            [host, port] => port.parse().ok().map(|p| (host.clone(), p)),
            _ => None,
        }
    }

    pub fn bind_addr(&self) -> Result<(IpAddr, u16), Error> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| Error::Config(format!("invalid host '{}'", self.host)))?;
        Ok((ip, self.port))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(6399, config.port);
        assert!(!config.aof_enabled);
        assert_eq!(crate::db::DEFAULT_STRIPES, config.stripes);
    }

    #[test]
    fn parses_a_config_file() {
        let config: Config = kv_config_parser::de::from_str(
            "port 7000\nappendonly yes\nappendfsync everysec\nstripes 64\nvector-dim 16\nloglevel debug\nlogfile ''\n",
        )
        .unwrap();
        assert_eq!(7000, config.port);
        assert!(config.aof_enabled);
        assert_eq!(AppendFsync::EverySecond, config.aof_fsync);
        assert_eq!(64, config.stripes);
        assert_eq!(16, config.vector_dim);
        assert_eq!(LogLevel::Debug, config.log.level);
    }

    #[test]
    fn save_rules_pair_up_seconds_and_changes() {
        let mut config = Config::default();
        config.save_rules = vec![60, 10000, 300, 10];
        assert_eq!(vec![(10000, 60), (10, 300)], config.save_trigger_pairs());
    }

    #[test]
    fn cli_override_wins_over_file_default() {
        let mut config = Config::default();
        config.apply_override("port", "9999").unwrap();
        assert_eq!(9999, config.port);
    }
}
