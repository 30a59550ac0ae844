//! Bridge version and the gate scripts use to check compatibility.

use serde::Serialize;
use std::fmt;

/// Semantic version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VersionTriple {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Version of the bridge API exposed to scripts.
pub const BRIDGE_VERSION: VersionTriple = VersionTriple::new(3, 6, 0);

impl VersionTriple {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// True iff `self >= (major, minor, patch)`, comparing major, then minor,
    /// then patch. Script-supplied components may be negative; those always
    /// compare lower.
    pub fn satisfies(&self, major: i64, minor: i64, patch: i64) -> bool {
        let current = (
            i64::from(self.major),
            i64::from(self.minor),
            i64::from(self.patch),
        );
        current >= (major, minor, patch)
    }

    pub fn info(&self) -> VersionInfo {
        VersionInfo {
            version_string: self.to_string(),
            major: self.major,
            minor: self.minor,
            patch: self.patch,
        }
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What `pso.get_version()` hands back to scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version_string: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// `pso.require_version` against the compiled-in bridge version.
pub fn require_version(major: i64, minor: i64, patch: i64) -> bool {
    BRIDGE_VERSION.satisfies(major, minor, patch)
}
