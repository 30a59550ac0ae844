//! Console stand-in for the game host.

use bbmod_core::HostHooks;
use bbmod_core::staging::PendingFontChange;
use std::sync::atomic::{AtomicBool, Ordering};

/// Host that writes script output to stdout and errors to stderr.
#[derive(Debug, Default)]
pub struct ConsoleHost {
    sleep_hack: AtomicBool,
}

impl ConsoleHost {
    pub fn sleep_hack_enabled(&self) -> bool {
        self.sleep_hack.load(Ordering::Relaxed)
    }
}

impl HostHooks for ConsoleHost {
    fn on_unhandled_error(&self, message: &str) {
        eprintln!("uncaught error: {message}");
    }

    fn on_log(&self, line: &str) {
        println!("{line}");
    }

    fn play_sound(&self, path: &str) {
        tracing::info!(path, "play sound");
    }

    fn set_sleep_hack_enabled(&self, enabled: bool) {
        self.sleep_hack.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "sleep hack");
    }

    fn reload_theme(&self) {
        tracing::debug!("theme reload requested");
    }

    fn apply_font_change(&self, change: &PendingFontChange) -> bbmod_core::Result<()> {
        let faces = std::iter::once(&change.primary).chain(change.secondary.as_ref());
        for face in faces {
            if !face.path.is_file() {
                return Err(bbmod_core::Error::Reconfigure(format!(
                    "font file not found: {}",
                    face.path.display()
                )));
            }
        }
        println!(
            "font changed: {} ({}px)",
            change.primary.path.display(),
            change.primary.size
        );
        Ok(())
    }

    fn show_fatal_error(&self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }
}
