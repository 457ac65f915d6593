mod agent_mgr;
mod audit;
mod checks;
mod config;
mod dispatcher;
mod link;
mod monitor_mgr;
mod server;
mod signals;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::server::Server;
use clap::{Arg, Command};
use std::fs;
use std::path::PathBuf;
use std::process;
use warden_core::logging::{self, crit, info};
use warden_plugin::loader::load_service_plugins;
use warden_plugin::{PluginRegistry, ServicePlugin};
use warden_storage::backend::Database;
use warden_storage::lock::FileLock;
use warden_storage::Storage;

fn main() {
    let matches = Command::new("wardend")
        .about("Runs the warden policy decision service.")
        .arg(
            Arg::new("CONFIG_FILE")
                .help("Path to the config file; compiled-in defaults apply without one")
                .required(false),
        )
        .get_matches();

    signals::install();
    let logger = logging::init();

    let config = match matches.get_one::<String>("CONFIG_FILE") {
        Some(path) => match Config::from_file(&PathBuf::from(path)) {
            Ok(config) => config,
            Err(err) => {
                crit!(logger, "config file unusable"; "path" => path, "error" => %err);
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Err(err) = fs::create_dir_all(&config.state_dir) {
        crit!(logger, "state directory unusable";
              "path" => %config.state_dir.display(), "error" => %err);
        process::exit(1);
    }

    // One service instance at a time; held until exit.
    let _lock = match FileLock::try_acquire(&config.state_dir, &logger) {
        Ok(lock) => lock,
        Err(err) => {
            crit!(logger, "could not acquire database lock"; "error" => ?err);
            process::exit(1);
        }
    };

    let mut storage = Storage::new(Database::new(config.db_dir(), &logger));
    if let Err(err) = storage.load() {
        crit!(logger, "database unusable"; "error" => ?err);
        process::exit(1);
    }

    let mut plugins: PluginRegistry<dyn ServicePlugin> = PluginRegistry::new(logger.clone());
    load_service_plugins(&mut plugins, &config.plugin_dir, &logger);

    let audit = AuditLog::new(&logger);
    let dispatcher = Dispatcher::new(storage, plugins, audit, &logger);

    let mut server = match Server::bind(&config, dispatcher, &logger) {
        Ok(server) => server,
        Err(err) => {
            crit!(logger, "could not bind service sockets"; "error" => %err);
            process::exit(1);
        }
    };

    info!(logger, "wardend started");
    server.run();
}
