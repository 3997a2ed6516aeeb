//! Fixed file contents and permission values written into the hybrid layer.

use crate::descriptor::BUILDPACK_TOML;

/// Windows detect script: always passes.
pub const DETECT_BAT: &str = "exit 0";

/// Windows build script.
pub const BUILD_BAT: &str = "@echo off\necho Hello windows\nexit 0";

/// Linux detect script: always passes.
pub const DETECT_SH: &str = "#!/bin/sh\nexit 0";

/// Linux build script.
pub const BUILD_SH: &str = "#!/bin/sh\necho Hello linux\nexit 0";

/// Self-relative security descriptor owned by ContainerAdministrator
/// (S-1-5-93-2-1) with no DACL, so every container user may read it.
/// Base64 as expected by the `MSWINDOWS.rawsd` PAX record.
pub const WINDOWS_READ_SECURITY_DESCRIPTOR: &str =
    "AQAAgBQAAAAoAAAAAAAAAAAAAAABAwAAAAAABV0AAAACAAAAAQAAAAEDAAAAAAAFXQAAAAIAAAABAAAA";

/// World read/write/execute, so any Linux user can traverse and run.
pub const LINUX_READ_MODE: u32 = 0o777;

/// Everything the planner writes as file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub buildpack_toml: String,
    pub detect_bat: String,
    pub build_bat: String,
    pub detect_sh: String,
    pub build_sh: String,
}

impl Payload {
    /// The payload compiled into the binary.
    pub fn embedded() -> Self {
        Self {
            buildpack_toml: BUILDPACK_TOML.to_string(),
            detect_bat: DETECT_BAT.to_string(),
            build_bat: BUILD_BAT.to_string(),
            detect_sh: DETECT_SH.to_string(),
            build_sh: BUILD_SH.to_string(),
        }
    }
}

