use crate::offline::OfflineAdmin;
use crate::online::OnlineAdmin;
use slog::{info, o, Logger};
use std::path::PathBuf;
use warden_core::{paths, ApiCode, BucketId, Policy, PolicyKey, PolicyResult};

pub struct AdminConfig {
    pub socket_path: PathBuf,
    pub state_dir: PathBuf,
}

impl Default for AdminConfig {
    fn default() -> AdminConfig {
        AdminConfig {
            socket_path: paths::admin_socket(),
            state_dir: PathBuf::from(paths::STATE_DIR),
        }
    }
}

/// The administrative operations, independent of transport.
pub trait AdminApi {
    fn set_bucket(&mut self, bucket: &BucketId, default: PolicyResult) -> ApiCode;

    fn remove_bucket(&mut self, bucket: &BucketId) -> ApiCode;

    fn set_policies(
        &mut self,
        insert_or_update: Vec<(BucketId, Vec<Policy>)>,
        remove: Vec<(BucketId, Vec<PolicyKey>)>,
    ) -> ApiCode;

    fn check(
        &mut self,
        key: &PolicyKey,
        start_bucket: &BucketId,
        recursive: bool,
    ) -> Result<PolicyResult, ApiCode>;

    fn list(
        &mut self,
        bucket: &BucketId,
        filter: &PolicyKey,
    ) -> Result<Vec<Policy>, ApiCode>;

    fn erase(&mut self, start_bucket: &BucketId, recursive: bool, filter: &PolicyKey) -> ApiCode;

    fn descriptions(&mut self) -> Result<Vec<(u16, String)>, ApiCode>;
}

/// Facade choosing the transport at construction time: online when the
/// admin socket answers, offline otherwise.
pub struct Admin {
    inner: Box<dyn AdminApi>,
}

impl Admin {
    pub fn new(config: AdminConfig, log: &Logger) -> Result<Admin, ApiCode> {
        let log = log.new(o!("module" => "admin"));

        match OnlineAdmin::connect(&config.socket_path, &log) {
            Ok(online) => {
                info!(log, "administration goes through the service");
                Ok(Admin {
                    inner: Box::new(online),
                })
            }
            Err(_) => {
                info!(log, "service not available, administering the database directly");
                let offline = OfflineAdmin::open(&config.state_dir, &log)?;
                Ok(Admin {
                    inner: Box::new(offline),
                })
            }
        }
    }

    pub fn api(&mut self) -> &mut dyn AdminApi {
        &mut *self.inner
    }
}
