//! Notification hooks implemented by the host integration.
//!
//! The bridge never talks to the game (or whatever embeds it) directly; it
//! calls back through [`HostHooks`]. Every method has a default, so a host only
//! overrides what it can actually do. The Lua-facing defaults forward to the
//! functions a script registered on the `pso` table (`pso.on_init`,
//! `pso.on_key_pressed`, ...), and do nothing when the script left them out.

use crate::staging::PendingFontChange;
use mlua::{Function, IntoLuaMulti, Lua, Table};

/// Name of the global table the bridge installs into.
pub const SCRIPT_TABLE: &str = "pso";

/// Host notification hooks consumed by the bridge.
pub trait HostHooks: Send + Sync {
    /// An error reached the top-level handler. Already logged.
    fn on_unhandled_error(&self, _message: &str) {}

    /// A script printed a line. Already logged.
    fn on_log(&self, _line: &str) {}

    /// The entry script finished loading.
    fn on_init(&self, lua: &Lua) -> mlua::Result<()> {
        call_script_hook(lua, "on_init", ())
    }

    fn on_key_pressed(&self, lua: &Lua, code: i32) -> mlua::Result<()> {
        call_script_hook(lua, "on_key_pressed", code)
    }

    fn on_key_released(&self, lua: &Lua, code: i32) -> mlua::Result<()> {
        call_script_hook(lua, "on_key_released", code)
    }

    /// Once per frame, after the safe point work.
    fn on_present(&self, lua: &Lua) -> mlua::Result<()> {
        call_script_hook(lua, "on_present", ())
    }

    fn play_sound(&self, path: &str) {
        tracing::debug!(path, "play_sound not supported by this host");
    }

    fn is_focused(&self) -> bool {
        true
    }

    /// Toggle the host's frame-limiter patch. Memory writes are the host's job.
    fn set_sleep_hack_enabled(&self, _enabled: bool) {}

    /// Re-read the theme file into the UI style.
    fn reload_theme(&self) {}

    /// Regenerate rendering resources for a staged font change. Called only
    /// between frames.
    fn apply_font_change(&self, _change: &PendingFontChange) -> crate::Result<()> {
        Ok(())
    }

    /// Unrecoverable initialization failure; the process exits right after.
    fn show_fatal_error(&self, title: &str, message: &str) {
        tracing::error!(title, message, "fatal bridge error");
    }
}

/// Host that relies on every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptHooks;

impl HostHooks for ScriptHooks {}

/// Call `pso.<name>(args)` if the script defined it.
pub fn call_script_hook<'lua, A>(lua: &'lua Lua, name: &str, args: A) -> mlua::Result<()>
where
    A: IntoLuaMulti<'lua>,
{
    let Some(table) = lua.globals().get::<_, Option<Table>>(SCRIPT_TABLE)? else {
        return Ok(());
    };
    match table.get::<_, Option<Function>>(name)? {
        Some(callback) => callback.call::<_, ()>(args),
        None => Ok(()),
    }
}
