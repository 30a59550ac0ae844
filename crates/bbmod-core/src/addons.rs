//! Addon and font discovery.

use std::fs;
use std::io;
use std::path::Path;

/// Names of the addon directories under `addons_dir`, sorted.
///
/// Directories named in `excluded` (the fonts folder, native DLL folders) are
/// skipped. A missing `addons_dir` yields an empty list.
pub fn list_addon_directories(addons_dir: &Path, excluded: &[String]) -> io::Result<Vec<String>> {
    list_entries(addons_dir, |name, is_dir| {
        is_dir && !excluded.iter().any(|skip| skip == name)
    })
}

/// Names of the regular files in `fonts_dir`, sorted.
pub fn list_font_files(fonts_dir: &Path) -> io::Result<Vec<String>> {
    list_entries(fonts_dir, |_, is_dir| !is_dir)
}

fn list_entries(dir: &Path, keep: impl Fn(&str, bool) -> bool) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!(path = %entry.path().display(), "skipping non-UTF-8 entry");
            continue;
        };
        let is_dir = entry.file_type()?.is_dir();
        if keep(&name, is_dir) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
