//! The script-facing `pso` table.
//!
//! [`BridgeApi`] holds the state scripts can observe or change and exposes one
//! method per script call. [`install`] binds those methods into Lua, each one
//! wrapped in [`translate`] so that no failure escapes as anything other than a
//! Lua error.

use crate::addons;
use crate::config::{AddonsConfig, BridgeConfig};
use crate::error::BridgeError;
use crate::host::{HostHooks, SCRIPT_TABLE};
use crate::memory::{
    DEFAULT_CSTR_LEN, DEFAULT_WSTR_LEN, HostMemory, MemoryReader, Primitive, ProcessMemory,
};
use crate::staging::{FontRequest, FontStaging};
use crate::translate::{emit_log_line, format_print_line, handle_uncaught, translate};
use crate::version::{self, BRIDGE_VERSION, VersionInfo};
use mlua::{Lua, Table, Value, Variadic};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Language used when `set_language` is called without an argument.
pub const DEFAULT_LANGUAGE: &str = "EN";

/// State and operations behind the `pso` table.
pub struct BridgeApi {
    reader: MemoryReader<Arc<dyn HostMemory>>,
    hooks: Arc<dyn HostHooks>,
    fonts: FontStaging,
    reload_requested: AtomicBool,
    language: Mutex<String>,
    addons: AddonsConfig,
    base_address: u64,
    started: Instant,
}

impl std::fmt::Debug for BridgeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeApi")
            .field("addons_dir", &self.addons.dir)
            .field("base_address", &format_args!("{:#x}", self.base_address))
            .field("reload_requested", &self.reload_requested())
            .field("font_pending", &self.fonts.is_pending())
            .finish_non_exhaustive()
    }
}

impl BridgeApi {
    /// API reading the current process's memory.
    pub fn new(config: &BridgeConfig, hooks: Arc<dyn HostHooks>) -> Self {
        Self::with_memory(config, hooks, Arc::new(ProcessMemory))
    }

    /// API over an arbitrary memory source.
    pub fn with_memory(
        config: &BridgeConfig,
        hooks: Arc<dyn HostHooks>,
        memory: Arc<dyn HostMemory>,
    ) -> Self {
        Self {
            reader: MemoryReader::new(memory),
            hooks,
            fonts: FontStaging::new(),
            reload_requested: AtomicBool::new(false),
            language: Mutex::new(config.host.language.clone()),
            addons: config.addons.clone(),
            base_address: config.host.base_address,
            started: Instant::now(),
        }
    }

    pub fn hooks(&self) -> &Arc<dyn HostHooks> {
        &self.hooks
    }

    pub fn fonts(&self) -> &FontStaging {
        &self.fonts
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn read<T: Primitive>(&self, address: i64) -> Result<T, BridgeError> {
        self.reader.read(to_address(address))
    }

    pub fn read_cstr(&self, address: i64, length: Option<i64>) -> Result<Vec<u8>, BridgeError> {
        self.reader
            .read_cstr(to_address(address), length.unwrap_or(DEFAULT_CSTR_LEN))
    }

    pub fn read_wstr(&self, address: i64, length: Option<i64>) -> Result<String, BridgeError> {
        self.reader
            .read_wstr(to_address(address), length.unwrap_or(DEFAULT_WSTR_LEN))
    }

    pub fn read_mem(&self, address: i64, length: i64) -> Result<Vec<u8>, BridgeError> {
        self.reader.read_mem(to_address(address), length)
    }

    pub fn read_mem_str(&self, address: i64, length: Option<i64>) -> Result<Vec<u8>, BridgeError> {
        self.reader
            .read_mem_str(to_address(address), length.unwrap_or(DEFAULT_CSTR_LEN))
    }

    pub fn set_sleep_hack_enabled(&self, enabled: bool) {
        tracing::debug!(enabled, "sleep hack toggled by script");
        self.hooks.set_sleep_hack_enabled(enabled);
    }

    pub fn list_addon_directories(&self) -> Result<Vec<String>, BridgeError> {
        Ok(addons::list_addon_directories(
            &self.addons.dir,
            &self.addons.excluded_dirs,
        )?)
    }

    pub fn list_font_files(&self) -> Result<Vec<String>, BridgeError> {
        Ok(addons::list_font_files(&self.addons.fonts_path())?)
    }

    /// Stage a font change; it takes effect at the next safe point.
    pub fn change_global_font(&self, request: FontRequest) {
        self.fonts.request(request.resolve(&self.addons.fonts_path()));
    }

    fn language_lock(&self) -> MutexGuard<'_, String> {
        self.language.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_language(&self, language: Option<String>) {
        *self.language_lock() = language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    }

    pub fn language(&self) -> String {
        self.language_lock().clone()
    }

    pub fn version(&self) -> VersionInfo {
        BRIDGE_VERSION.info()
    }

    pub fn require_version(&self, major: i64, minor: i64, patch: i64) -> bool {
        version::require_version(major, minor, patch)
    }

    /// Ask for the runtime to be rebuilt at the next safe point.
    pub fn request_reload(&self) {
        self.reload_requested.store(true, Ordering::Release);
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_requested.load(Ordering::Acquire)
    }

    pub(crate) fn clear_reload(&self) {
        self.reload_requested.store(false, Ordering::Release);
    }

    pub fn cwd(&self) -> Result<PathBuf, BridgeError> {
        Ok(std::env::current_dir()?)
    }

    pub fn play_sound(&self, path: &str) {
        self.hooks.play_sound(path);
    }

    pub fn is_host_focused(&self) -> bool {
        self.hooks.is_focused()
    }

    /// Milliseconds since this API was created.
    pub fn tick_count(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn reload_custom_theme(&self) {
        self.hooks.reload_theme();
    }
}

fn to_address(address: i64) -> usize {
    address as usize
}

/// Append `bytes` to the array part of `sink`, one integer per byte.
fn append_bytes(sink: &Table, bytes: &[u8]) -> mlua::Result<()> {
    let start = sink.raw_len() + 1;
    for (offset, byte) in bytes.iter().enumerate() {
        sink.raw_set(start + offset, i64::from(*byte))?;
    }
    Ok(())
}

macro_rules! bind_typed_reads {
    ($lua:expr, $table:expr, $api:expr; $($name:literal => $ty:ty),* $(,)?) => {
        $(
            let reader = Arc::clone($api);
            $table.set(
                $name,
                $lua.create_function(move |_, address: i64| {
                    translate(concat!("pso.", $name), || reader.read::<$ty>(address))
                })?,
            )?;
        )*
    };
}

/// Bind `api` into the global `pso` table of `lua` and replace `print`.
pub fn install(lua: &Lua, api: &Arc<BridgeApi>) -> mlua::Result<()> {
    let pso = lua.create_table()?;

    bind_typed_reads!(lua, pso, api;
        "read_i8" => i8,
        "read_i16" => i16,
        "read_i32" => i32,
        "read_i64" => i64,
        "read_u8" => u8,
        "read_u16" => u16,
        "read_u32" => u32,
        "read_u64" => u64,
        "read_f32" => f32,
        "read_f64" => f64,
    );

    let a = Arc::clone(api);
    pso.set(
        "read_cstr",
        lua.create_function(move |lua, (address, length): (i64, Option<i64>)| {
            let bytes = translate("pso.read_cstr", || a.read_cstr(address, length))?;
            lua.create_string(&bytes)
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "read_wstr",
        lua.create_function(move |_, (address, length): (i64, Option<i64>)| {
            translate("pso.read_wstr", || a.read_wstr(address, length))
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "read_mem",
        lua.create_function(move |_, (sink, address, length): (Table, i64, i64)| {
            let bytes = translate("pso.read_mem", || a.read_mem(address, length))?;
            append_bytes(&sink, &bytes)?;
            Ok(sink)
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "read_mem_str",
        lua.create_function(move |lua, (address, length): (i64, Option<i64>)| {
            let bytes = translate("pso.read_mem_str", || a.read_mem_str(address, length))?;
            lua.create_string(&bytes)
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "set_sleep_hack_enabled",
        lua.create_function(move |_, enabled: bool| {
            translate("pso.set_sleep_hack_enabled", || {
                a.set_sleep_hack_enabled(enabled);
                Ok(())
            })
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "list_addon_directories",
        lua.create_function(move |lua, ()| {
            let names = translate("pso.list_addon_directories", || a.list_addon_directories())?;
            lua.create_sequence_from(names)
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "list_font_files",
        lua.create_function(move |lua, ()| {
            let names = translate("pso.list_font_files", || a.list_font_files())?;
            lua.create_sequence_from(names)
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "change_global_font",
        lua.create_function(
            move |_,
                  (name, size, oversample_h, oversample_v, merge_fonts, name2, size2): (
                String,
                f32,
                Option<i32>,
                Option<i32>,
                Option<bool>,
                Option<String>,
                Option<f32>,
            )| {
                translate("pso.change_global_font", || {
                    let defaults = FontRequest::default();
                    a.change_global_font(FontRequest {
                        name,
                        size,
                        oversample_h: oversample_h.unwrap_or(defaults.oversample_h),
                        oversample_v: oversample_v.unwrap_or(defaults.oversample_v),
                        merge_fonts: merge_fonts.unwrap_or(defaults.merge_fonts),
                        name2: name2.unwrap_or(defaults.name2),
                        size2: size2.unwrap_or(defaults.size2),
                    });
                    Ok(())
                })
            },
        )?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "set_language",
        lua.create_function(move |_, language: Option<String>| {
            translate("pso.set_language", || {
                a.set_language(language);
                Ok(())
            })
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "get_language",
        lua.create_function(move |_, ()| translate("pso.get_language", || Ok(a.language())))?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "get_version",
        lua.create_function(move |lua, ()| {
            let info = translate("pso.get_version", || Ok(a.version()))?;
            let table = lua.create_table()?;
            table.set("version_string", info.version_string)?;
            table.set("major", info.major)?;
            table.set("minor", info.minor)?;
            table.set("patch", info.patch)?;
            Ok(table)
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "require_version",
        lua.create_function(move |_, (major, minor, patch): (i64, i64, i64)| {
            translate("pso.require_version", || {
                Ok(a.require_version(major, minor, patch))
            })
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "error_handler",
        lua.create_function(move |lua, message: Value| {
            let args: Variadic<Value> = std::iter::once(message).collect();
            let text = format_print_line(lua, &args);
            Ok(handle_uncaught(lua, a.hooks.as_ref(), &text))
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "reload",
        lua.create_function(move |_, ()| {
            translate("pso.reload", || {
                a.request_reload();
                Ok(())
            })
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "get_cwd",
        lua.create_function(move |_, ()| {
            translate("pso.get_cwd", || {
                Ok(a.cwd()?.to_string_lossy().into_owned())
            })
        })?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "play_sound",
        lua.create_function(move |_, path: String| {
            translate("pso.play_sound", || {
                a.play_sound(&path);
                Ok(())
            })
        })?,
    )?;

    let a = Arc::clone(api);
    let is_focused = lua.create_function(move |_, ()| {
        translate("pso.is_host_focused", || Ok(a.is_host_focused()))
    })?;
    pso.set("is_host_focused", is_focused.clone())?;
    pso.set("is_pso_focused", is_focused)?;

    let a = Arc::clone(api);
    pso.set(
        "get_tick_count",
        lua.create_function(move |_, ()| translate("pso.get_tick_count", || Ok(a.tick_count())))?,
    )?;

    let a = Arc::clone(api);
    pso.set(
        "reload_custom_theme",
        lua.create_function(move |_, ()| {
            translate("pso.reload_custom_theme", || {
                a.reload_custom_theme();
                Ok(())
            })
        })?,
    )?;

    pso.set("base_address", api.base_address)?;
    pso.set("log_items", lua.create_table()?)?;

    lua.globals().set(SCRIPT_TABLE, pso)?;

    let a = Arc::clone(api);
    lua.globals().set(
        "print",
        lua.create_function(move |lua, args: Variadic<Value>| {
            let line = format_print_line(lua, &args);
            emit_log_line(a.hooks.as_ref(), &line);
            Ok(())
        })?,
    )?;

    tracing::debug!(base_address = %format_args!("{:#x}", api.base_address), "pso table installed");
    Ok(())
}
