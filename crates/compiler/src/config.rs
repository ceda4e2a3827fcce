//! Target and build configuration.
//!
//! Values arrive from CLI flags, optionally defaulted by a `mica.toml`
//! manifest next to the source file; CLI flags win. Validation happens here
//! so the library never sees an unsupported combination.

use std::path::Path;

use serde::Deserialize;

use crate::error::CompileError;
use crate::types::{ArchitectureSizes, RegisterSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86,
    X64,
    Wasm32,
}

impl Architecture {
    pub fn from_name(name: &str) -> Result<Self, CompileError> {
        match name {
            "x86" => Ok(Architecture::X86),
            "x64" => Ok(Architecture::X64),
            "wasm32" => Ok(Architecture::Wasm32),
            other => Err(CompileError::message(format!(
                "Unknown architecture '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Windows,
    Emscripten,
}

impl Os {
    pub fn from_name(name: &str) -> Result<Self, CompileError> {
        match name {
            "linux" => Ok(Os::Linux),
            "windows" => Ok(Os::Windows),
            "emscripten" => Ok(Os::Emscripten),
            other => Err(CompileError::message(format!("Unknown OS '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Gnu,
    Msvc,
}

impl Toolchain {
    pub fn from_name(name: &str) -> Result<Self, CompileError> {
        match name {
            "gnu" => Ok(Toolchain::Gnu),
            "msvc" => Ok(Toolchain::Msvc),
            other => Err(CompileError::message(format!(
                "Unknown toolchain '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildConfig {
    Debug,
    Release,
}

impl BuildConfig {
    /// Accepts exactly `debug` and `release`.
    pub fn from_name(name: &str) -> Result<Self, CompileError> {
        match name {
            "debug" => Ok(BuildConfig::Debug),
            "release" => Ok(BuildConfig::Release),
            other => Err(CompileError::message(format!("Unknown config '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub architecture: Architecture,
    pub os: Os,
    pub toolchain: Toolchain,
    pub build_config: BuildConfig,
}

impl Target {
    pub fn host() -> Self {
        let os = if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            Os::Linux
        };

        Target {
            architecture: Architecture::X64,
            os,
            toolchain: default_toolchain(os),
            build_config: BuildConfig::Debug,
        }
    }

    pub fn architecture_sizes(&self) -> ArchitectureSizes {
        match self.architecture {
            Architecture::X86 => ArchitectureSizes {
                address_size: RegisterSize::Size32,
                default_integer_size: RegisterSize::Size32,
                default_float_size: RegisterSize::Size32,
                boolean_size: RegisterSize::Size8,
            },
            Architecture::X64 => ArchitectureSizes {
                address_size: RegisterSize::Size64,
                default_integer_size: RegisterSize::Size64,
                default_float_size: RegisterSize::Size64,
                boolean_size: RegisterSize::Size8,
            },
            Architecture::Wasm32 => ArchitectureSizes {
                address_size: RegisterSize::Size32,
                default_integer_size: RegisterSize::Size32,
                default_float_size: RegisterSize::Size32,
                boolean_size: RegisterSize::Size8,
            },
        }
    }

    /// Reject combinations no backend exists for.
    pub fn validate(&self) -> Result<(), CompileError> {
        let supported = match self.os {
            Os::Emscripten => self.architecture == Architecture::Wasm32,
            Os::Windows => self.architecture != Architecture::Wasm32,
            Os::Linux => {
                self.architecture != Architecture::Wasm32 && self.toolchain == Toolchain::Gnu
            }
        };

        if !supported {
            return Err(CompileError::message(
                "Unsupported OS, architecture, and toolchain combination",
            ));
        }

        Ok(())
    }
}

pub fn default_toolchain(os: Os) -> Toolchain {
    match os {
        Os::Windows => Toolchain::Msvc,
        _ => Toolchain::Gnu,
    }
}

/// Optional `mica.toml` manifest next to the root source file.
///
/// ```toml
/// [build]
/// arch = "x64"
/// os = "linux"
/// config = "release"
/// output = "out"
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub build: BuildSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BuildSection {
    pub arch: Option<String>,
    pub os: Option<String>,
    pub toolchain: Option<String>,
    pub config: Option<String>,
    pub output: Option<String>,
}

/// Load the manifest from the given directory, if one exists.
pub fn load_manifest(directory: &Path) -> Result<Option<Manifest>, CompileError> {
    let path = directory.join("mica.toml");

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(CompileError::message(format!(
                "Cannot read '{}': {error}",
                path.display()
            )));
        }
    };

    let manifest: Manifest = toml::from_str(&contents).map_err(|error| {
        CompileError::message(format!("Invalid manifest '{}': {error}", path.display()))
    })?;

    Ok(Some(manifest))
}

/// Resolve the effective target from manifest defaults and CLI overrides.
pub fn resolve_target(
    manifest: Option<&Manifest>,
    arch: Option<&str>,
    os: Option<&str>,
    toolchain: Option<&str>,
    build_config: Option<&str>,
) -> Result<Target, CompileError> {
    let host = Target::host();
    let build = manifest.map(|manifest| &manifest.build);

    let architecture = match arch.or(build.and_then(|build| build.arch.as_deref())) {
        Some(name) => Architecture::from_name(name)?,
        None => host.architecture,
    };

    let os = match os.or(build.and_then(|build| build.os.as_deref())) {
        Some(name) => Os::from_name(name)?,
        None => host.os,
    };

    let toolchain = match toolchain.or(build.and_then(|build| build.toolchain.as_deref())) {
        Some(name) => Toolchain::from_name(name)?,
        None => default_toolchain(os),
    };

    let build_config = match build_config.or(build.and_then(|build| build.config.as_deref())) {
        Some(name) => BuildConfig::from_name(name)?,
        None => BuildConfig::Debug,
    };

    let target = Target {
        architecture,
        os,
        toolchain,
        build_config,
    };
    target.validate()?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_config_accepts_debug_and_release_only() {
        assert_eq!(BuildConfig::from_name("debug").unwrap(), BuildConfig::Debug);
        assert_eq!(
            BuildConfig::from_name("release").unwrap(),
            BuildConfig::Release
        );
        assert!(BuildConfig::from_name("fast").is_err());
        assert!(BuildConfig::from_name("").is_err());
    }

    #[test]
    fn x64_sizes() {
        let target = Target {
            architecture: Architecture::X64,
            os: Os::Linux,
            toolchain: Toolchain::Gnu,
            build_config: BuildConfig::Debug,
        };
        let sizes = target.architecture_sizes();
        assert_eq!(sizes.address_size, RegisterSize::Size64);
        assert_eq!(sizes.boolean_size, RegisterSize::Size8);
    }

    #[test]
    fn wasm_requires_emscripten() {
        let target = Target {
            architecture: Architecture::Wasm32,
            os: Os::Linux,
            toolchain: Toolchain::Gnu,
            build_config: BuildConfig::Debug,
        };
        assert!(target.validate().is_err());

        let target = Target {
            architecture: Architecture::Wasm32,
            os: Os::Emscripten,
            toolchain: Toolchain::Gnu,
            build_config: BuildConfig::Debug,
        };
        assert!(target.validate().is_ok());
    }

    #[test]
    fn manifest_defaults_lose_to_cli_flags() {
        let manifest = Manifest {
            build: BuildSection {
                arch: Some("x86".to_string()),
                os: None,
                toolchain: None,
                config: Some("release".to_string()),
                output: None,
            },
        };

        let target = resolve_target(
            Some(&manifest),
            Some("x64"),
            Some("linux"),
            None,
            None,
        )
        .unwrap();

        assert_eq!(target.architecture, Architecture::X64);
        // The manifest still supplies what the CLI left unset.
        assert_eq!(target.build_config, BuildConfig::Release);
    }

    #[test]
    fn manifest_parses() {
        let manifest: Manifest =
            toml::from_str("[build]\narch = \"x64\"\nconfig = \"debug\"\n").unwrap();
        assert_eq!(manifest.build.arch.as_deref(), Some("x64"));
    }
}
