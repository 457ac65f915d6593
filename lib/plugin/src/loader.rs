//! Discovery of external plugins: every regular, non-hidden file in the
//! plugin directory is opened as a shared object and probed for the
//! `create`/`destroy` pair. A failing candidate is logged and skipped; the
//! host keeps running with whatever loaded.

use crate::api::{CheckOutcome, ClientPlugin, PluginError, PolicyDescription, ServicePlugin};
use crate::registry::PluginRegistry;
use libloading::Library;
use slog::{info, warn, Logger};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use warden_core::{ApiCode, PolicyKey, PolicyResult};

pub type ServiceCreateFn = unsafe extern "C" fn() -> *mut dyn ServicePlugin;
pub type ServiceDestroyFn = unsafe extern "C" fn(*mut dyn ServicePlugin);

pub type ClientCreateFn = unsafe extern "C" fn() -> *mut dyn ClientPlugin;
pub type ClientDestroyFn = unsafe extern "C" fn(*mut dyn ClientPlugin);

pub const CREATE_SYMBOL: &[u8] = b"create";
pub const DESTROY_SYMBOL: &[u8] = b"destroy";

/// Service plugin object owned by the host but allocated by the library;
/// released through the library's own `destroy`.
struct ExternalServicePlugin {
    raw: *mut dyn ServicePlugin,
    destroy: ServiceDestroyFn,
}

impl ServicePlugin for ExternalServicePlugin {
    fn supported_descriptions(&self) -> Vec<PolicyDescription> {
        unsafe { (*self.raw).supported_descriptions() }
    }

    fn check(&mut self, key: &PolicyKey) -> Result<CheckOutcome, PluginError> {
        unsafe { (*self.raw).check(key) }
    }

    fn update(&mut self, key: &PolicyKey, agent_data: &str) -> Result<PolicyResult, PluginError> {
        unsafe { (*self.raw).update(key, agent_data) }
    }

    fn invalidate(&mut self) {
        unsafe { (*self.raw).invalidate() }
    }
}

impl Drop for ExternalServicePlugin {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.raw) }
    }
}

struct ExternalClientPlugin {
    raw: *mut dyn ClientPlugin,
    destroy: ClientDestroyFn,
}

impl ClientPlugin for ExternalClientPlugin {
    fn supported_descriptions(&self) -> Vec<PolicyDescription> {
        unsafe { (*self.raw).supported_descriptions() }
    }

    fn is_cacheable(&self, session: &str, result: &PolicyResult) -> bool {
        unsafe { (*self.raw).is_cacheable(session, result) }
    }

    fn is_usable(
        &self,
        session: &str,
        cached_session: &str,
        update_session: &mut bool,
        result: &mut PolicyResult,
    ) -> bool {
        unsafe { (*self.raw).is_usable(session, cached_session, update_session, result) }
    }

    fn to_result(&self, session: &str, result: &PolicyResult) -> ApiCode {
        unsafe { (*self.raw).to_result(session, result) }
    }

    fn invalidate(&mut self) {
        unsafe { (*self.raw).invalidate() }
    }
}

impl Drop for ExternalClientPlugin {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.raw) }
    }
}

/// Candidate shared objects in the plugin directory, alphabetically.
fn plugin_candidates(dir: &Path, log: &Logger) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(log, "could not scan plugin directory";
                  "dir" => %dir.display(), "error" => %err);
            return Vec::new();
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().map(|kind| kind.is_file()).unwrap_or(false)
                && !entry.file_name().to_string_lossy().starts_with('.')
        })
        .map(|entry| entry.path())
        .collect();

    candidates.sort();
    candidates
}

pub fn load_service_plugins(
    registry: &mut PluginRegistry<dyn ServicePlugin>,
    dir: &Path,
    log: &Logger,
) {
    for path in plugin_candidates(dir, log) {
        let library = match unsafe { Library::new(&path) } {
            Ok(library) => library,
            Err(err) => {
                warn!(log, "file could not be opened as a plugin";
                      "path" => %path.display(), "error" => %err);
                continue;
            }
        };

        let plugin = unsafe {
            let create = match library.get::<ServiceCreateFn>(CREATE_SYMBOL) {
                Ok(symbol) => symbol,
                Err(err) => {
                    warn!(log, "missing create symbol";
                          "path" => %path.display(), "error" => %err);
                    continue;
                }
            };
            let destroy = match library.get::<ServiceDestroyFn>(DESTROY_SYMBOL) {
                Ok(symbol) => *symbol,
                Err(err) => {
                    warn!(log, "missing destroy symbol";
                          "path" => %path.display(), "error" => %err);
                    continue;
                }
            };

            let raw = create();
            if raw.is_null() {
                warn!(log, "plugin creation returned null"; "path" => %path.display());
                continue;
            }

            ExternalServicePlugin { raw, destroy }
        };

        let descriptions = plugin.supported_descriptions();
        if descriptions.is_empty() {
            warn!(log, "plugin supports no policy types"; "path" => %path.display());
            continue;
        }

        info!(log, "service plugin loaded";
              "path" => %path.display(), "types" => descriptions.len());

        let plugin: Rc<RefCell<Box<dyn ServicePlugin>>> = Rc::new(RefCell::new(Box::new(plugin)));
        registry.register(descriptions, plugin);
        registry.adopt_library(library);
    }
}

pub fn load_client_plugins(
    registry: &mut PluginRegistry<dyn ClientPlugin>,
    dir: &Path,
    log: &Logger,
) {
    for path in plugin_candidates(dir, log) {
        let library = match unsafe { Library::new(&path) } {
            Ok(library) => library,
            Err(err) => {
                warn!(log, "file could not be opened as a plugin";
                      "path" => %path.display(), "error" => %err);
                continue;
            }
        };

        let plugin = unsafe {
            let create = match library.get::<ClientCreateFn>(CREATE_SYMBOL) {
                Ok(symbol) => symbol,
                Err(err) => {
                    warn!(log, "missing create symbol";
                          "path" => %path.display(), "error" => %err);
                    continue;
                }
            };
            let destroy = match library.get::<ClientDestroyFn>(DESTROY_SYMBOL) {
                Ok(symbol) => *symbol,
                Err(err) => {
                    warn!(log, "missing destroy symbol";
                          "path" => %path.display(), "error" => %err);
                    continue;
                }
            };

            let raw = create();
            if raw.is_null() {
                warn!(log, "plugin creation returned null"; "path" => %path.display());
                continue;
            }

            ExternalClientPlugin { raw, destroy }
        };

        let descriptions = plugin.supported_descriptions();
        if descriptions.is_empty() {
            warn!(log, "plugin supports no policy types"; "path" => %path.display());
            continue;
        }

        info!(log, "client plugin loaded";
              "path" => %path.display(), "types" => descriptions.len());

        let plugin: Rc<RefCell<Box<dyn ClientPlugin>>> = Rc::new(RefCell::new(Box::new(plugin)));
        registry.register(descriptions, plugin);
        registry.adopt_library(library);
    }
}
