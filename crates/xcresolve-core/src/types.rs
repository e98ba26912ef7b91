//! Core types for xcresolve.
//!
//! This module defines the vocabulary used throughout the crate:
//!
//! - [`Error`] - Error taxonomy for resolution operations
//! - [`Platform`] - Apple platforms a target can build for
//! - [`ProductType`] - Apple product-type identifiers from `PRODUCT_TYPE`
//! - [`Prompter`] - Seam for interactive selection, injected by callers

use std::path::PathBuf;

/// Error taxonomy for xcresolve operations.
///
/// Construction-layer problems (invalid option combinations, missing
/// project bundles) are fatal and raised immediately; a build cannot
/// proceed without a valid project path. Parsing-layer misses (an absent
/// build setting, an unknown target) are NOT errors - they degrade to
/// `Ok(None)` at the query site.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid combination of user-supplied options, such as passing both
    /// a project and a workspace path.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The resolved project/workspace path does not exist as a directory.
    ///
    /// Xcode project bundles are directories on disk, so a plain file at
    /// the given path is rejected too.
    #[error("could not find project at path '{}'", .0.display())]
    ProjectNotFound(PathBuf),

    /// Multiple schemes were found, none was specified, and the run is in
    /// a continuous-integration context where prompting is impossible.
    #[error("multiple schemes found but none specified")]
    AmbiguousScheme,

    /// The project listing contained no schemes at all.
    #[error("no schemes found")]
    NoSchemes,

    /// The toolchain invocation did not finish within the configured
    /// timeout, across all configured retries. Each expired attempt kills
    /// the still-running child before retrying.
    #[error("'{command}' timed out after {attempts} attempt(s) of {timeout_secs}s each")]
    ToolchainTimeout {
        command: String,
        attempts: u64,
        timeout_secs: u64,
    },

    /// The toolchain invocation ran to completion but exited non-zero.
    #[error("'{command}' failed with exit status {status}")]
    ToolchainFailed { command: String, status: i32 },

    /// An I/O error occurred while resolving paths or reading the
    /// workspace data file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An interactive prompt could not be completed (e.g. stdin closed).
    #[error("prompt failed: {0}")]
    Prompt(String),
}

/// Apple platforms derived from the `SUPPORTED_PLATFORMS` build setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Platform {
    Ios,
    MacOs,
    TvOs,
    WatchOs,
}

impl Platform {
    /// Maps an SDK token from `SUPPORTED_PLATFORMS` to a platform.
    ///
    /// Device and simulator SDKs collapse onto the same platform.
    /// Unrecognized tokens yield `None` and are dropped by callers.
    pub fn from_sdk_token(token: &str) -> Option<Self> {
        match token {
            "macosx" => Some(Platform::MacOs),
            "iphonesimulator" | "iphoneos" => Some(Platform::Ios),
            "watchsimulator" | "watchos" => Some(Platform::WatchOs),
            "appletvsimulator" | "appletvos" => Some(Platform::TvOs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::MacOs => "macOS",
            Platform::TvOs => "tvOS",
            Platform::WatchOs => "watchOS",
        }
    }
}

/// Product types reported by the `PRODUCT_TYPE` build setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ProductType {
    Application,
    Framework,
    DynamicLibrary,
    StaticLibrary,
    UnitTestBundle,
    UiTestBundle,
    CommandLineTool,
}

impl ProductType {
    /// Parses an Apple product-type identifier.
    ///
    /// Matching is exact string equality; anything unknown yields `None`.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        match identifier {
            "com.apple.product-type.application" => Some(ProductType::Application),
            "com.apple.product-type.framework" => Some(ProductType::Framework),
            "com.apple.product-type.library.dynamic" => Some(ProductType::DynamicLibrary),
            "com.apple.product-type.library.static" => Some(ProductType::StaticLibrary),
            "com.apple.product-type.bundle.unit-test" => Some(ProductType::UnitTestBundle),
            "com.apple.product-type.bundle.ui-testing" => Some(ProductType::UiTestBundle),
            "com.apple.product-type.tool" => Some(ProductType::CommandLineTool),
            _ => None,
        }
    }

    pub fn identifier(&self) -> &'static str {
        match self {
            ProductType::Application => "com.apple.product-type.application",
            ProductType::Framework => "com.apple.product-type.framework",
            ProductType::DynamicLibrary => "com.apple.product-type.library.dynamic",
            ProductType::StaticLibrary => "com.apple.product-type.library.static",
            ProductType::UnitTestBundle => "com.apple.product-type.bundle.unit-test",
            ProductType::UiTestBundle => "com.apple.product-type.bundle.ui-testing",
            ProductType::CommandLineTool => "com.apple.product-type.tool",
        }
    }

    /// Test bundles, either unit-test or ui-testing.
    pub fn is_test_bundle(&self) -> bool {
        matches!(self, ProductType::UnitTestBundle | ProductType::UiTestBundle)
    }
}

/// Interactive selection seam.
///
/// The core never reads stdin itself; scheme and path selection go through
/// this trait so tests can stub the interaction away and the CLI can plug
/// in a terminal implementation.
pub trait Prompter {
    /// Asks the user to pick one of `options`, returning the chosen entry.
    fn choose(&self, message: &str, options: &[String]) -> Result<String, Error>;

    /// Asks the user for a free-form line of input.
    fn input(&self, message: &str) -> Result<String, Error>;
}
