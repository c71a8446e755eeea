//! Node plugin configuration, read from a YAML file.
//!
//! ```yaml
//! listen: 0.0.0.0:6090
//! node_id: node-01            # defaults to the hostname
//! plugin_name: s3.csi.rk8s.io
//! max_volumes_per_node: 0     # 0 = unlimited
//! log_format: text            # or json
//! tls:                        # omitted: self-signed certificate
//!   cert: /etc/s3csi/tls.crt
//!   key: /etc/s3csi/tls.key
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use libs3csi::NodeOptions;
use serde::Deserialize;

const DEFAULT_PLUGIN_NAME: &str = "s3.csi.rk8s.io";

#[derive(Debug, Deserialize)]
pub struct Config {
    // ip:port the QUIC endpoint binds to
    pub listen: SocketAddr,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default = "default_plugin_name")]
    pub plugin_name: String,
    #[serde(default)]
    pub max_volumes_per_node: u64,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_plugin_name() -> String {
    DEFAULT_PLUGIN_NAME.to_owned()
}

impl Config {
    /// Node service settings; the node id falls back to the hostname.
    pub fn node_options(&self) -> Result<NodeOptions> {
        let node_id = match &self.node_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => nix::unistd::gethostname()
                .context("Failed to read hostname for node id")?
                .to_string_lossy()
                .into_owned(),
        };
        Ok(NodeOptions {
            plugin_name: self.plugin_name.clone(),
            node_id,
            max_volumes: self.max_volumes_per_node,
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let cfg: Config = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("listen: 127.0.0.1:6090\n").unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:6090".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.plugin_name, DEFAULT_PLUGIN_NAME);
        assert_eq!(cfg.max_volumes_per_node, 0);
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert!(cfg.tls.is_none());

        // Hostname fallback.
        let options = cfg.node_options().unwrap();
        assert!(!options.node_id.is_empty());
    }

    #[test]
    fn full_config() {
        let yaml = r#"
listen: 0.0.0.0:7000
node_id: node-01
plugin_name: cos.csi.example
max_volumes_per_node: 32
log_format: json
tls:
  cert: /etc/s3csi/tls.crt
  key: /etc/s3csi/tls.key
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.tls.as_ref().unwrap().key, Path::new("/etc/s3csi/tls.key"));

        let options = cfg.node_options().unwrap();
        assert_eq!(options.node_id, "node-01");
        assert_eq!(options.plugin_name, "cos.csi.example");
        assert_eq!(options.max_volumes, 32);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("s3csi.yaml");
        std::fs::write(&path, "listen: 127.0.0.1:6090\nnode_id: n1\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.node_id.as_deref(), Some("n1"));

        let err = load_config(&tmp.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
