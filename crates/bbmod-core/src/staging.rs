//! Deferred font reconfiguration.
//!
//! Scripts ask for a new font while a frame is being built, which is exactly
//! when the font atlas is in use. The request is parked here and applied by the
//! host between frames.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A font file and its pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct FontFace {
    pub path: PathBuf,
    pub size: f32,
}

/// Font regeneration waiting for the next safe point.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFontChange {
    pub primary: FontFace,
    pub oversample_h: i32,
    pub oversample_v: i32,
    pub merge_fonts: bool,
    pub secondary: Option<FontFace>,
}

/// Arguments of `pso.change_global_font`, before path resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FontRequest {
    pub name: String,
    pub size: f32,
    pub oversample_h: i32,
    pub oversample_v: i32,
    pub merge_fonts: bool,
    pub name2: String,
    pub size2: f32,
}

impl Default for FontRequest {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 13.0,
            oversample_h: 1,
            oversample_v: 1,
            merge_fonts: false,
            name2: String::new(),
            size2: -1.0,
        }
    }
}

impl FontRequest {
    /// Resolve font names against `fonts_dir`. An empty `name2` means no secondary face.
    pub fn resolve(self, fonts_dir: &Path) -> PendingFontChange {
        let secondary = (!self.name2.is_empty()).then(|| FontFace {
            path: fonts_dir.join(&self.name2),
            size: self.size2,
        });
        PendingFontChange {
            primary: FontFace {
                path: fonts_dir.join(&self.name),
                size: self.size,
            },
            oversample_h: self.oversample_h,
            oversample_v: self.oversample_v,
            merge_fonts: self.merge_fonts,
            secondary,
        }
    }
}

/// Holds at most one pending font change. Last write wins.
#[derive(Debug, Default)]
pub struct FontStaging {
    pending: Mutex<Option<PendingFontChange>>,
}

impl FontStaging {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingFontChange>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stage `change`, returning the unapplied request it replaced, if any.
    pub fn request(&self, change: PendingFontChange) -> Option<PendingFontChange> {
        let superseded = self.lock().replace(change);
        if let Some(previous) = &superseded {
            tracing::debug!(
                font = %previous.primary.path.display(),
                "pending font change superseded before it was applied"
            );
        }
        superseded
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    /// Apply the staged change, if any. Only call this at a safe point.
    ///
    /// The request is cleared before `apply` runs, so a failing request is not
    /// retried on the next frame. Returns whether a change was applied.
    pub fn apply_pending<E>(
        &self,
        apply: impl FnOnce(&PendingFontChange) -> Result<(), E>,
    ) -> Result<bool, E> {
        let Some(change) = self.lock().take() else {
            return Ok(false);
        };
        tracing::info!(
            font = %change.primary.path.display(),
            size = change.primary.size,
            merge = change.merge_fonts,
            "applying staged font change"
        );
        apply(&change)?;
        Ok(true)
    }
}
