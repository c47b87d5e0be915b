// Configuration loading for one node
// Sources, weakest to strongest: built-in defaults, an optional config
// file, YUCA_-prefixed environment variables, command-line flags

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment};
use serde::Deserialize;

use yuca_client::JoinConfig;
use yuca_consistency::RaftSettings;

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "yuca-server", about = "Replicated configuration store node")]
struct Cli {
    /// Stable numeric node id, unique within the cluster
    #[arg(long)]
    node_id: Option<u64>,

    /// HTTP listen address (host:port)
    #[arg(long)]
    http_addr: Option<String>,

    /// Address other nodes use to reach this one; defaults to http-addr
    #[arg(long)]
    advertise_addr: Option<String>,

    /// Root data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Bootstrap a brand-new cluster with this node as the sole voter
    #[arg(long)]
    first_node: bool,

    /// Address of an existing member to join through
    #[arg(long)]
    seed_addr: Option<String>,
}

/// Application configuration loaded from defaults, file, environment, and
/// command line.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub node_id: u64,
    pub http_addr: String,
    pub advertise_addr: Option<String>,
    pub data_dir: PathBuf,

    pub election_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub snapshot_threshold: u64,
    pub snapshot_retain: usize,
    pub apply_timeout_ms: u64,

    pub first_node: bool,
    pub seed_addr: Option<String>,
    pub join_max_retries: u32,
    pub join_settle_delay_ms: u64,
    pub join_backoff_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            http_addr: "127.0.0.1:8080".to_string(),
            advertise_addr: None,
            data_dir: PathBuf::from("./data"),
            election_timeout_ms: 1500,
            heartbeat_interval_ms: 500,
            snapshot_threshold: 5000,
            snapshot_retain: 2,
            apply_timeout_ms: 10_000,
            first_node: false,
            seed_addr: None,
            join_max_retries: 5,
            join_settle_delay_ms: 10_000,
            join_backoff_ms: 1_000,
        }
    }
}

impl ServerConfig {
    /// Load configuration, applying command-line overrides last.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(config::File::with_name("conf/yuca").required(false))
            .add_source(Environment::with_prefix("yuca").try_parsing(true))
            .build()?;

        let mut config: ServerConfig = settings.try_deserialize()?;

        if let Some(v) = args.node_id {
            config.node_id = v;
        }
        if let Some(v) = args.http_addr {
            config.http_addr = v;
        }
        if let Some(v) = args.advertise_addr {
            config.advertise_addr = Some(v);
        }
        if let Some(v) = args.data_dir {
            config.data_dir = v;
        }
        if args.first_node {
            config.first_node = true;
        }
        if let Some(v) = args.seed_addr {
            config.seed_addr = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.snapshot_retain >= 1,
            "snapshot retain count must be at least one"
        );
        anyhow::ensure!(
            self.first_node || self.seed_addr.is_some(),
            "a non-first node needs a seed address to join through"
        );
        Ok(())
    }

    /// Address other cluster members use for this node.
    pub fn advertise_addr(&self) -> String {
        self.advertise_addr
            .clone()
            .unwrap_or_else(|| self.http_addr.clone())
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }

    pub fn raft_settings(&self) -> RaftSettings {
        RaftSettings {
            election_timeout_ms: self.election_timeout_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            snapshot_threshold: self.snapshot_threshold,
            snapshot_retain: self.snapshot_retain,
            data_dir: self.data_dir.clone(),
        }
    }

    /// Join settings; only meaningful for a non-first node.
    pub fn join_config(&self) -> anyhow::Result<JoinConfig> {
        let seed_addr = self
            .seed_addr
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no seed address configured"))?;

        Ok(JoinConfig {
            seed_addr,
            max_retries: self.join_max_retries,
            settle_delay: Duration::from_millis(self.join_settle_delay_ms),
            backoff: Duration::from_millis(self.join_backoff_ms),
            request_timeout: self.apply_timeout(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid_for_first_node() {
        let config = ServerConfig {
            first_node: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.advertise_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_non_first_node_requires_seed() {
        let config = ServerConfig::default();
        assert!(config.validate().is_err());

        let config = ServerConfig {
            seed_addr: Some("127.0.0.1:8080".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_snapshot_retain_is_rejected() {
        let config = ServerConfig {
            first_node: true,
            snapshot_retain: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_advertise_addr_override() {
        let config = ServerConfig {
            advertise_addr: Some("10.0.0.5:8080".to_string()),
            ..Default::default()
        };
        assert_eq!(config.advertise_addr(), "10.0.0.5:8080");
    }

    #[test]
    fn test_raft_settings_mapping() {
        let config = ServerConfig {
            data_dir: PathBuf::from("/var/lib/yuca"),
            snapshot_retain: 3,
            ..Default::default()
        };
        let settings = config.raft_settings();

        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/yuca"));
        assert_eq!(settings.snapshot_retain, 3);
        assert!(settings.validate().is_ok());
    }
}
