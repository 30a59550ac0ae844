//! Translation of native failures into script-visible errors.
//!
//! Nothing a script does through the bridge may take the host down. Every
//! bridge call runs through [`translate`], which turns a [`BridgeError`], a
//! Lua runtime error, or a Rust panic into an ordinary Lua error. Errors that
//! escape the script altogether end up in [`report_uncaught`], which must not
//! fail itself.

use crate::error::BridgeError;
use crate::host::HostHooks;
use mlua::{Function, Lua, Table, Value, Variadic};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Tracing target for script output and script errors.
pub const SCRIPT_TARGET: &str = "bbmod::script";

/// Run bridge operation `op`, converting every failure into a Lua error.
pub fn translate<R>(op: &'static str, f: impl FnOnce() -> Result<R, BridgeError>) -> mlua::Result<R> {
    let err = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(err)) => err,
        Err(payload) => BridgeError::Unknown(panic_message(payload.as_ref())),
    };
    tracing::debug!(op, error = %err, "bridge call failed");
    Err(match err {
        BridgeError::Script(inner) => inner,
        other => mlua::Error::RuntimeError(format!("{op}: {other}")),
    })
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Top-level handler for errors no script caught.
///
/// Logs the message and a traceback, then forwards the message to the host.
/// Failures (errors or panics) while producing the traceback or notifying the
/// host are logged at debug level and dropped. Returns `message` unchanged.
pub fn report_uncaught(
    message: &str,
    traceback: impl FnOnce() -> Result<String, BridgeError>,
    notify: impl FnOnce(&str),
) -> String {
    tracing::error!(target: SCRIPT_TARGET, "uncaught error: {message}");

    match panic::catch_unwind(AssertUnwindSafe(traceback)) {
        Ok(Ok(trace)) => tracing::error!(target: SCRIPT_TARGET, "{trace}"),
        Ok(Err(err)) => tracing::debug!(error = %err, "traceback unavailable"),
        Err(payload) => tracing::debug!(
            panic = %panic_message(payload.as_ref()),
            "traceback generation panicked"
        ),
    }

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| notify(message))) {
        tracing::debug!(
            panic = %panic_message(payload.as_ref()),
            "unhandled-error hook panicked"
        );
    }

    message.to_string()
}

/// `debug.traceback()` from the running Lua state.
pub fn traceback(lua: &Lua) -> Result<String, BridgeError> {
    let debug: Table = lua.globals().get("debug")?;
    let traceback: Function = debug.get("traceback")?;
    Ok(traceback.call::<_, String>(())?)
}

/// [`report_uncaught`] wired to a Lua state and host hooks.
pub fn handle_uncaught(lua: &Lua, hooks: &dyn HostHooks, message: &str) -> String {
    report_uncaught(message, || traceback(lua), |msg| hooks.on_unhandled_error(msg))
}

/// Join `print` arguments the way Lua's own `print` would: `tostring` each,
/// separated by tabs. Values whose `__tostring` fails print as their type name.
pub fn format_print_line(lua: &Lua, args: &Variadic<Value>) -> String {
    let tostring: Option<Function> = lua.globals().get("tostring").ok();
    args.iter()
        .map(|value| {
            tostring
                .as_ref()
                .and_then(|f| f.call::<_, mlua::String>(value.clone()).ok())
                .map_or_else(
                    || value.type_name().to_string(),
                    |s| s.to_string_lossy().into_owned(),
                )
        })
        .collect::<Vec<_>>()
        .join("\t")
}

/// Send one line of script output to the log and the host. Never fails.
pub fn emit_log_line(hooks: &dyn HostHooks, line: &str) {
    tracing::info!(target: SCRIPT_TARGET, "{line}");
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hooks.on_log(line))) {
        tracing::debug!(panic = %panic_message(payload.as_ref()), "log hook panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn value_errors_become_runtime_errors() {
        let err = translate::<()>("pso.read_u8", || Err(BridgeError::fault(0x10, 1))).unwrap_err();
        match err {
            mlua::Error::RuntimeError(msg) => {
                assert!(msg.starts_with("pso.read_u8: invalid memory"), "{msg}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lua_errors_pass_through() {
        let err = translate::<()>("op", || {
            Err(mlua::Error::RuntimeError("from lua".into()).into())
        })
        .unwrap_err();
        assert!(err.to_string().contains("from lua"));
    }

    #[test]
    fn panics_become_unknown_faults() {
        let err = translate::<()>("op", || panic!("exploded")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("caught unknown fault"), "{msg}");
        assert!(msg.contains("exploded"), "{msg}");
    }

    #[test]
    fn success_passes_value() {
        assert_eq!(translate("op", || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn uncaught_handler_survives_failing_traceback() {
        let notified = Cell::new(false);
        let out = report_uncaught(
            "script broke",
            || panic!("traceback exploded"),
            |_| notified.set(true),
        );
        assert_eq!(out, "script broke");
        assert!(notified.get());

        let out = report_uncaught(
            "again",
            || Err(BridgeError::Unknown("no debug library".into())),
            |_| {},
        );
        assert_eq!(out, "again");
    }

    #[test]
    fn uncaught_handler_survives_failing_notify() {
        let out = report_uncaught("msg", || Ok("trace".into()), |_| panic!("host hook exploded"));
        assert_eq!(out, "msg");
    }

    #[test]
    fn traceback_without_debug_library_is_an_error() {
        let lua = Lua::new();
        lua.globals().set("debug", Value::Nil).unwrap();
        assert!(traceback(&lua).is_err());
    }

    #[test]
    fn print_line_is_tab_joined() {
        let lua = Lua::new();
        let args: Variadic<Value> = lua
            .load(r#"return "a", 1, true, nil"#)
            .eval::<mlua::MultiValue>()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(format_print_line(&lua, &args), "a\t1\ttrue\tnil");
    }

    #[test]
    fn print_line_tolerates_bad_tostring() {
        let lua = Lua::new();
        let value: Value = lua
            .load("return setmetatable({}, { __tostring = function() error('nope') end })")
            .eval()
            .unwrap();
        let args: Variadic<Value> = std::iter::once(value).collect();
        assert_eq!(format_print_line(&lua, &args), "table");
    }
}
