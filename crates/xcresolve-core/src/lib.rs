//! Xcode build-target and code-signing resolution.
//!
//! `xcresolve-core` figures out which Xcode project/workspace, scheme, and
//! provisioning profiles apply to a build by combining text output scraped
//! from the Apple toolchain with user-supplied configuration.
//!
//! # Architecture
//!
//! The crate consists of a few small layers:
//!
//! - **Parsers** ([`Listing`], [`SettingsTable`]) - turn the toolchain's
//!   `-list` and `-showBuildSettings` text output into queryable models
//! - **Project model** ([`Project`]) - owns a resolved project or
//!   workspace path, lazily drives the parsers through an injected
//!   [`ToolchainRunner`], and answers typed queries (platforms, product
//!   types, scheme selection)
//! - **Signing** ([`SigningResolver`]) - detects per-target
//!   provisioning-profile assignments from the referenced projects and
//!   merges them with a caller-supplied mapping under an export-method
//!   precedence policy
//!
//! Process execution and interactive prompting sit behind the
//! [`ToolchainRunner`] and [`Prompter`] traits, so everything above them
//! resolves deterministically in tests.
//!
//! # Example
//!
//! ```no_run
//! use xcresolve_core::{Project, ProjectOptions, XcodebuildRunner};
//!
//! fn main() -> Result<(), xcresolve_core::Error> {
//!     let options = ProjectOptions {
//!         project: Some("App.xcodeproj".into()),
//!         ..ProjectOptions::default()
//!     };
//!     let mut project = Project::new(options, Box::new(XcodebuildRunner::new()))?;
//!
//!     println!("schemes: {:?}", project.schemes()?);
//!     println!("bundle id: {:?}", project.default_app_identifier()?);
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod listing;
pub mod project;
pub mod settings;
pub mod signing;
pub mod toolchain;
pub mod types;

pub use env::EnvFlags;
pub use listing::Listing;
pub use project::{Project, ProjectOptions};
pub use settings::SettingsTable;
pub use signing::{
    ProfileMapping, SigningResolver, app_identifier_contains, merge_profile_mapping,
};
pub use toolchain::{ToolchainRunner, XcodebuildRunner, version_at_least};
pub use types::{Error, Platform, ProductType, Prompter};
