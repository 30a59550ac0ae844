//! Host doubles and addon directory fixtures.

use bbmod_core::mlua::Lua;
use bbmod_core::staging::PendingFontChange;
use bbmod_core::{Bridge, BridgeConfig, HostHooks};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// RecordingHooks: records every notification, forwards script hooks
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingHooks {
    pub logs: Mutex<Vec<String>>,
    pub unhandled: Mutex<Vec<String>>,
    pub fonts_applied: Mutex<Vec<PendingFontChange>>,
    pub fatal: Mutex<Vec<(String, String)>>,
    pub theme_reloads: AtomicUsize,
    pub fail_font_apply: AtomicBool,
    pub panic_on_unhandled: AtomicBool,
}

impl RecordingHooks {
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn unhandled(&self) -> Vec<String> {
        self.unhandled.lock().unwrap().clone()
    }

    pub fn fonts_applied(&self) -> Vec<PendingFontChange> {
        self.fonts_applied.lock().unwrap().clone()
    }
}

impl HostHooks for RecordingHooks {
    fn on_unhandled_error(&self, message: &str) {
        self.unhandled.lock().unwrap().push(message.to_string());
        if self.panic_on_unhandled.load(Ordering::SeqCst) {
            panic!("host notification failed");
        }
    }

    fn on_log(&self, line: &str) {
        self.logs.lock().unwrap().push(line.to_string());
    }

    fn reload_theme(&self) {
        self.theme_reloads.fetch_add(1, Ordering::SeqCst);
    }

    fn apply_font_change(&self, change: &PendingFontChange) -> bbmod_core::Result<()> {
        if self.fail_font_apply.load(Ordering::SeqCst) {
            return Err(bbmod_core::Error::Reconfigure(format!(
                "missing font {}",
                change.primary.path.display()
            )));
        }
        self.fonts_applied.lock().unwrap().push(change.clone());
        Ok(())
    }

    fn show_fatal_error(&self, title: &str, message: &str) {
        self.fatal
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Addon directory fixture
// ---------------------------------------------------------------------------

/// Temporary addons directory holding `init.lua`, kept alive with the bridge.
pub struct Fixture {
    pub dir: TempDir,
    pub hooks: Arc<RecordingHooks>,
    pub bridge: Bridge,
}

impl Fixture {
    pub fn new(init_lua: &str) -> Self {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "init.lua", init_lua);
        let mut config = BridgeConfig::default();
        config.addons.dir = dir.path().to_path_buf();
        let hooks = Arc::new(RecordingHooks::default());
        let bridge = Bridge::new(config, hooks.clone());
        Self { dir, hooks, bridge }
    }

    /// Fixture whose bridge is already initialized.
    pub fn ready(init_lua: &str) -> Self {
        let mut fixture = Self::new(init_lua);
        fixture.bridge.initialize().unwrap();
        fixture
    }

    pub fn lua(&self) -> &Lua {
        self.bridge.lua().expect("bridge has a runtime")
    }
}

pub fn write_file(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
