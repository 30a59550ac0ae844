//! Bridge lifecycle: runtime creation, reload and the per-frame safe point.
//!
//! The [`Bridge`] owns the Lua state and is driven from the host's frame
//! thread. Everything that could disturb a frame in progress (rebuilding the
//! runtime, regenerating fonts, running key callbacks) is deferred to
//! [`Bridge::frame_tick`].

use crate::api::{BridgeApi, install};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::events::{KeyEventQueue, KeyEventSender};
use crate::fpu;
use crate::host::HostHooks;
use crate::memory::HostMemory;
use crate::translate::handle_uncaught;
use mlua::{Lua, LuaOptions, StdLib};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Title and text of the dialog shown when the entry script cannot be loaded.
pub const FATAL_INIT_TITLE: &str = "Lua error";
pub const FATAL_INIT_MESSAGE: &str = "Failed to load init.lua";

/// Lifecycle state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Ready,
    Reloading,
    FatalInit,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Reloading => "reloading",
            Self::FatalInit => "fatal-init",
        };
        f.write_str(name)
    }
}

/// What one [`Bridge::frame_tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub reloaded: bool,
    pub font_applied: bool,
    pub key_events: usize,
    pub presented: bool,
}

/// Owns the script runtime and everything shared with it.
pub struct Bridge {
    config: BridgeConfig,
    api: Arc<BridgeApi>,
    events: Arc<KeyEventQueue>,
    lua: Option<Lua>,
    state: BridgeState,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state)
            .field("api", &self.api)
            .field("queued_key_events", &self.events.len())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    pub fn new(config: BridgeConfig, hooks: Arc<dyn HostHooks>) -> Self {
        let api = Arc::new(BridgeApi::new(&config, hooks));
        Self::from_api(config, api)
    }

    /// Bridge whose scripts read from `memory` instead of the current process.
    pub fn with_memory(
        config: BridgeConfig,
        hooks: Arc<dyn HostHooks>,
        memory: Arc<dyn HostMemory>,
    ) -> Self {
        let api = Arc::new(BridgeApi::with_memory(&config, hooks, memory));
        Self::from_api(config, api)
    }

    fn from_api(config: BridgeConfig, api: Arc<BridgeApi>) -> Self {
        Self {
            config,
            api,
            events: Arc::new(KeyEventQueue::new()),
            lua: None,
            state: BridgeState::Uninitialized,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// The live runtime, if the entry script loaded.
    pub fn lua(&self) -> Option<&Lua> {
        self.lua.as_ref()
    }

    pub fn api(&self) -> &Arc<BridgeApi> {
        &self.api
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// (Re)create the runtime and run the entry script.
    ///
    /// Any previous runtime is dropped first. A failing entry script leaves the
    /// bridge in [`BridgeState::FatalInit`] with no runtime.
    pub fn initialize(&mut self) -> Result<()> {
        self.start_runtime(new_runtime())
    }

    fn start_runtime(&mut self, lua: Lua) -> Result<()> {
        self.lua = None;
        let hooks = Arc::clone(self.api.hooks());

        if let Err(err) = install(&lua, &self.api) {
            self.state = BridgeState::FatalInit;
            return Err(err.into());
        }

        let path = self.config.addons.entry_script_path();
        if let Err(message) = run_entry_script(&lua, &path) {
            handle_uncaught(&lua, hooks.as_ref(), &message);
            self.state = BridgeState::FatalInit;
            // A broken script is not retried on the next tick.
            self.api.clear_reload();
            return Err(Error::EntryScript { path, message });
        }

        if let Err(err) = fpu::isolated(|| hooks.on_init(&lua)) {
            handle_uncaught(&lua, hooks.as_ref(), &err.to_string());
        }
        self.api.clear_reload();
        hooks.reload_theme();

        self.lua = Some(lua);
        self.state = BridgeState::Ready;
        tracing::info!(entry_script = %path.display(), "script bridge ready");
        Ok(())
    }

    /// [`initialize`](Self::initialize), exiting the process with status 1 if
    /// the entry script fails. Other errors are returned.
    pub fn initialize_or_exit(&mut self) -> Result<()> {
        match self.initialize() {
            Err(err @ Error::EntryScript { .. }) => {
                self.report_fatal(&err);
                std::process::exit(1)
            }
            other => other,
        }
    }

    /// Tell the user the entry script could not be loaded.
    fn report_fatal(&self, err: &Error) {
        tracing::error!(error = %err, hint = err.hint(), "cannot continue without the entry script");
        self.api
            .hooks()
            .show_fatal_error(FATAL_INIT_TITLE, FATAL_INIT_MESSAGE);
    }

    pub fn request_reload(&self) {
        self.api.request_reload();
    }

    pub fn reload_requested(&self) -> bool {
        self.api.reload_requested()
    }

    /// Producer handle for key events, usable from any thread.
    pub fn key_sender(&self) -> KeyEventSender {
        KeyEventSender::new(Arc::clone(&self.events))
    }

    pub fn push_key_pressed(&self, code: i32) {
        self.events.push_pressed(code);
    }

    pub fn push_key_released(&self, code: i32) {
        self.events.push_released(code);
    }

    /// Run the between-frames safe point.
    ///
    /// In order: rebuild the runtime if a reload was requested, apply a staged
    /// font change, dispatch queued key events, then call the present hook.
    /// Script errors are reported through the uncaught handler. A reload whose
    /// entry script fails is shown to the user as fatal and returned as an
    /// error; the bridge is then in [`BridgeState::FatalInit`] and further ticks
    /// only drop queued key events.
    pub fn frame_tick(&mut self) -> Result<FrameStats> {
        let mut stats = FrameStats::default();

        if self.api.reload_requested() {
            tracing::info!("reloading script runtime");
            self.state = BridgeState::Reloading;
            if let Err(err) = self.initialize() {
                if matches!(err, Error::EntryScript { .. }) {
                    self.report_fatal(&err);
                }
                return Err(err);
            }
            stats.reloaded = true;
        }

        let hooks = Arc::clone(self.api.hooks());

        match self
            .api
            .fonts()
            .apply_pending(|change| hooks.apply_font_change(change))
        {
            Ok(applied) => stats.font_applied = applied,
            Err(err) => tracing::warn!(error = %err, hint = err.hint(), "staged font change failed"),
        }

        let Some(lua) = self.lua.as_ref() else {
            let dropped = self.events.take_snapshot().len();
            if dropped > 0 {
                tracing::debug!(dropped, state = %self.state, "no script runtime, key events dropped");
            }
            return Ok(stats);
        };

        stats.key_events = self.events.dispatch(|event| {
            let result = if event.pressed {
                hooks.on_key_pressed(lua, event.code)
            } else {
                hooks.on_key_released(lua, event.code)
            };
            if let Err(err) = result {
                handle_uncaught(lua, hooks.as_ref(), &err.to_string());
            }
        });

        if let Err(err) = fpu::isolated(|| hooks.on_present(lua)) {
            handle_uncaught(lua, hooks.as_ref(), &err.to_string());
        }
        stats.presented = true;

        Ok(stats)
    }

    /// [`frame_tick`](Self::frame_tick), exiting the process with status 1 when
    /// a reload cannot load the entry script.
    pub fn frame_tick_or_exit(&mut self) -> Result<FrameStats> {
        match self.frame_tick() {
            Err(Error::EntryScript { .. }) => std::process::exit(1),
            other => other,
        }
    }
}

/// Fresh runtime with the safe standard library plus `debug`, which the
/// uncaught-error handler uses for tracebacks.
#[allow(unsafe_code)]
fn new_runtime() -> Lua {
    // SAFETY: addon scripts are trusted code loaded from the host's own
    // install directory; the debug library is not exposed to anything else.
    unsafe { Lua::unsafe_new_with(StdLib::ALL_SAFE | StdLib::DEBUG, LuaOptions::new()) }
}

fn run_entry_script(lua: &Lua, path: &Path) -> std::result::Result<(), String> {
    let source = std::fs::read(path)
        .map_err(|err| format!("cannot open {}: {err}", path.display()))?;
    lua.load(source)
        .set_name(format!("@{}", path.display()))
        .exec()
        .map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ScriptHooks;
    use tempfile::TempDir;

    fn bridge_with_script(script: &str) -> (TempDir, Bridge) {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("init.lua"), script).unwrap();
        let mut config = BridgeConfig::default();
        config.addons.dir = tmp.path().to_path_buf();
        (tmp, Bridge::new(config, Arc::new(ScriptHooks)))
    }

    #[test]
    fn starts_uninitialized() {
        let (_tmp, bridge) = bridge_with_script("");
        assert_eq!(bridge.state(), BridgeState::Uninitialized);
        assert!(bridge.lua().is_none());
    }

    #[test]
    fn initialize_runs_entry_script_and_on_init() {
        let (_tmp, mut bridge) = bridge_with_script(
            "inited = false\nfunction pso.on_init() inited = true end\n",
        );
        bridge.initialize().unwrap();
        assert_eq!(bridge.state(), BridgeState::Ready);
        let inited: bool = bridge.lua().unwrap().globals().get("inited").unwrap();
        assert!(inited);
    }

    #[test]
    fn missing_entry_script_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut config = BridgeConfig::default();
        config.addons.dir = tmp.path().join("nowhere");
        let mut bridge = Bridge::new(config, Arc::new(ScriptHooks));

        let err = bridge.initialize().unwrap_err();
        assert!(matches!(err, Error::EntryScript { .. }));
        assert_eq!(bridge.state(), BridgeState::FatalInit);
        assert!(bridge.lua().is_none());
    }

    #[test]
    fn tick_without_runtime_is_harmless() {
        let (_tmp, mut bridge) = bridge_with_script("");
        bridge.push_key_pressed(1);
        let stats = bridge.frame_tick().unwrap();
        assert_eq!(stats.key_events, 0);
        assert!(!stats.presented);
    }

    #[test]
    fn tick_without_runtime_drops_key_events() {
        let (_tmp, mut bridge) = bridge_with_script("");
        for code in 0..10 {
            bridge.push_key_pressed(code);
        }
        bridge.frame_tick().unwrap();
        bridge.push_key_released(3);
        bridge.frame_tick().unwrap();
        assert_eq!(bridge.events.len(), 0);
    }

    #[test]
    fn failed_install_leaves_no_ready_state() {
        let (_tmp, mut bridge) = bridge_with_script("");
        bridge.initialize().unwrap();
        assert_eq!(bridge.state(), BridgeState::Ready);

        let starved = new_runtime();
        starved.set_memory_limit(starved.used_memory()).unwrap();
        let err = bridge.start_runtime(starved).unwrap_err();

        assert!(matches!(err, Error::Lua(_)));
        assert_eq!(bridge.state(), BridgeState::FatalInit);
        assert!(bridge.lua().is_none());
    }

    #[test]
    fn debug_library_is_available() {
        let (_tmp, mut bridge) = bridge_with_script("");
        bridge.initialize().unwrap();
        let kind: String = bridge
            .lua()
            .unwrap()
            .load("return type(debug.traceback)")
            .eval()
            .unwrap();
        assert_eq!(kind, "function");
    }
}
