use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawConfig;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:24177";
pub const DEFAULT_PEER_PORT: u16 = 24177;
pub const DEFAULT_META_ROOT: &str = "/block-meta";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Validated daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: String,
    pub peer_port: u16,
    pub meta_root: PathBuf,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub log_filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            peer_port: DEFAULT_PEER_PORT,
            meta_root: PathBuf::from(DEFAULT_META_ROOT),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_filter: "info".to_string(),
        }
    }
}

/// Load the daemon config. A missing `path` (None) yields pure defaults; a
/// present but unreadable or invalid file is an error.
pub fn load_config(path: Option<&Path>) -> Result<DaemonConfig, ConfigError> {
    let raw = match path {
        None => RawConfig::default(),
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            debug!("loading daemon config from {}", path.display());
            serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
                path: path.display().to_string(),
                source: e,
            })?
        }
    };
    convert(raw)
}

fn convert(raw: RawConfig) -> Result<DaemonConfig, ConfigError> {
    let defaults = DaemonConfig::default();
    let rpc = raw.rpc.unwrap_or_default();

    let connect = rpc
        .connect_timeout_secs
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
    let request = rpc
        .request_timeout_secs
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if connect == 0 || request == 0 {
        return Err(ConfigError::Invalid(
            "rpc timeouts must be non-zero".to_string(),
        ));
    }
    if request < connect {
        return Err(ConfigError::Invalid(format!(
            "request timeout ({request}s) must not be shorter than connect timeout ({connect}s)"
        )));
    }

    let meta_root = raw.meta_root.unwrap_or_else(|| DEFAULT_META_ROOT.to_string());
    if meta_root.is_empty() {
        return Err(ConfigError::Invalid("meta_root must not be empty".to_string()));
    }

    Ok(DaemonConfig {
        listen: raw.listen.unwrap_or(defaults.listen),
        peer_port: raw.peer_port.unwrap_or(defaults.peer_port),
        meta_root: PathBuf::from(meta_root),
        connect_timeout: Duration::from_secs(connect),
        request_timeout: Duration::from_secs(request),
        log_filter: raw.log_filter.unwrap_or(defaults.log_filter),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.listen, DEFAULT_LISTEN);
        assert_eq!(cfg.peer_port, DEFAULT_PEER_PORT);
        assert_eq!(cfg.meta_root, PathBuf::from(DEFAULT_META_ROOT));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "meta_root: /mnt/shared\npeer_port: 24999").unwrap();
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.meta_root, PathBuf::from("/mnt/shared"));
        assert_eq!(cfg.peer_port, 24999);
        assert_eq!(cfg.listen, DEFAULT_LISTEN);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rpc:\n  connect_timeout_secs: 0").unwrap();
        assert!(matches!(
            load_config(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn request_shorter_than_connect_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "rpc:\n  connect_timeout_secs: 10\n  request_timeout_secs: 5"
        )
        .unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
