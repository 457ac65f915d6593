use serde_derive::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use warden_core::paths;

fn default_state_dir() -> PathBuf {
    PathBuf::from(paths::STATE_DIR)
}

fn default_socket_dir() -> PathBuf {
    paths::socket_dir()
}

fn default_plugin_dir() -> PathBuf {
    paths::service_plugin_dir()
}

/// Daemon configuration, read from a JSON file; every field has a
/// compile-time default so the file is optional.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub plugin_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            state_dir: default_state_dir(),
            socket_dir: default_socket_dir(),
            plugin_dir: default_plugin_dir(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> io::Result<Config> {
        let file = fs::File::open(path)?;
        serde_json::from_reader(file)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn db_dir(&self) -> PathBuf {
        self.state_dir.join(paths::DB_DIR)
    }

    pub fn client_socket(&self) -> PathBuf {
        self.socket_dir.join(paths::CLIENT_SOCKET)
    }

    pub fn admin_socket(&self) -> PathBuf {
        self.socket_dir.join(paths::ADMIN_SOCKET)
    }

    pub fn agent_socket(&self) -> PathBuf {
        self.socket_dir.join(paths::AGENT_SOCKET)
    }

    pub fn monitor_socket(&self) -> PathBuf {
        self.socket_dir.join(paths::MONITOR_SOCKET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_fields_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"state_dir\": \"/tmp/warden-test\"}}").unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.state_dir, PathBuf::from("/tmp/warden-test"));
        assert_eq!(config.plugin_dir, default_plugin_dir());
        assert_eq!(config.db_dir(), PathBuf::from("/tmp/warden-test/db"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(Config::from_file(file.path()).is_err());
    }
}
