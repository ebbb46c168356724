//=========================================================================
// Platform Detection
//=========================================================================
//
// Identifies the operating system the context runs on. Computed once at
// context construction and exposed read-only afterwards.
//
//=========================================================================

use std::fmt;

//=== Platform ============================================================

/// Operating system family the context is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
    Web,
    Unknown,
}

impl Platform {
    /// Detects the platform this binary was compiled for.
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_family = "wasm") {
            Self::Web
        } else {
            Self::Unknown
        }
    }

    /// Mobile platforms run with touch input and a suspend/resume cycle.
    pub fn is_mobile(self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }

    /// Lowercase name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Web => "web",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
