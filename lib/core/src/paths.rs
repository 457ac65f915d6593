//! Well-known filesystem locations. Compile-time defaults, overridable
//! through the environment for clients and through the daemon config file
//! for the service.

use std::env;
use std::path::PathBuf;

pub const STATE_DIR: &str = "/var/lib/warden/";
pub const SOCKET_DIR: &str = "/run/warden/";
pub const LIBRARY_DIR: &str = "/usr/lib/warden/";

pub const SOCKET_DIR_ENV: &str = "WARDEN_SOCKET_DIR";

pub const CLIENT_SOCKET: &str = "warden.socket";
pub const ADMIN_SOCKET: &str = "warden-admin.socket";
pub const AGENT_SOCKET: &str = "warden-agent.socket";
pub const MONITOR_SOCKET: &str = "warden-monitor-get.socket";

pub const DB_DIR: &str = "db";
pub const INDEX_FILENAME: &str = "buckets";
pub const CHECKSUM_FILENAME: &str = "checksum";
pub const GUARD_FILENAME: &str = "guard";
pub const BUCKET_FILENAME_PREFIX: &str = "_";
pub const BACKUP_SUFFIX: &str = "~";

pub const FIELD_SEPARATOR: char = ';';
pub const RECORD_SEPARATOR: char = '\n';

pub fn socket_dir() -> PathBuf {
    match env::var(SOCKET_DIR_ENV) {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => PathBuf::from(SOCKET_DIR),
    }
}

pub fn client_socket() -> PathBuf {
    socket_dir().join(CLIENT_SOCKET)
}

pub fn admin_socket() -> PathBuf {
    socket_dir().join(ADMIN_SOCKET)
}

pub fn agent_socket() -> PathBuf {
    socket_dir().join(AGENT_SOCKET)
}

pub fn monitor_socket() -> PathBuf {
    socket_dir().join(MONITOR_SOCKET)
}

pub fn service_plugin_dir() -> PathBuf {
    PathBuf::from(LIBRARY_DIR).join("plugin").join("service")
}

pub fn client_plugin_dir() -> PathBuf {
    PathBuf::from(LIBRARY_DIR).join("plugin").join("client")
}
