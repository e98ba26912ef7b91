//! The project model: a resolved Xcode project or workspace plus the
//! scheme/configuration selection logic built on top of the parsed
//! toolchain output.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::env::EnvFlags;
use crate::listing::Listing;
use crate::settings::SettingsTable;
use crate::toolchain::ToolchainRunner;
use crate::types::{Error, Platform, ProductType, Prompter};

/// User-supplied configuration for a build container.
///
/// Exactly one of `project`/`workspace` may be given. `scheme` and
/// `configuration` start out as whatever the caller knows and are filled
/// in by resolution ([`Project::select_scheme`],
/// [`Project::default_build_settings`]).
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    pub project: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub scheme: Option<String>,
    pub configuration: Option<String>,
    /// Silence the toolchain's diagnostic stream during invocations.
    pub suppress_stderr: bool,
}

impl ProjectOptions {
    /// The project path, treating an empty path as not given.
    pub fn project_path(&self) -> Option<&Path> {
        self.project
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// The workspace path, treating an empty path as not given.
    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// A resolved Xcode project or workspace.
///
/// Owns the injected [`ToolchainRunner`] and memoizes one [`Listing`] and
/// one [`SettingsTable`] per instance: repeated queries never re-invoke
/// the toolchain, and callers needing fresh data construct a new model.
pub struct Project {
    options: ProjectOptions,
    path: PathBuf,
    is_workspace: bool,
    runner: Box<dyn ToolchainRunner>,
    listing: Option<Listing>,
    settings: Option<SettingsTable>,
}

impl Project {
    /// Validates the options and resolves the container path.
    ///
    /// Passing both a project and a workspace is a configuration error,
    /// checked before any path validation. The surviving path is made
    /// absolute and must exist as a directory (Xcode bundles are
    /// directories on disk).
    pub fn new(options: ProjectOptions, runner: Box<dyn ToolchainRunner>) -> Result<Self, Error> {
        if options.project_path().is_some() && options.workspace_path().is_some() {
            return Err(Error::Configuration(
                "you can only pass either a workspace or a project path, not both".to_string(),
            ));
        }

        let given = options
            .workspace_path()
            .or_else(|| options.project_path())
            .ok_or_else(|| {
                Error::Configuration("no project or workspace path given".to_string())
            })?;

        let path = std::path::absolute(given)?;
        if !path.is_dir() {
            return Err(Error::ProjectNotFound(path));
        }

        let is_workspace = options.workspace_path().is_some();
        Ok(Project {
            options,
            path,
            is_workspace,
            runner,
            listing: None,
            settings: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_workspace(&self) -> bool {
        self.is_workspace
    }

    pub fn options(&self) -> &ProjectOptions {
        &self.options
    }

    pub(crate) fn runner(&self) -> &dyn ToolchainRunner {
        self.runner.as_ref()
    }

    /// Container basename with its `.xcworkspace`/`.xcodeproj` suffix
    /// stripped.
    pub fn project_name(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = if self.is_workspace {
            ".xcworkspace"
        } else {
            ".xcodeproj"
        };
        match name.strip_suffix(suffix) {
            Some(stripped) => stripped.to_string(),
            None => name,
        }
    }

    pub fn schemes(&mut self) -> Result<&[String], Error> {
        Ok(&self.parsed_listing()?.schemes)
    }

    pub fn targets(&mut self) -> Result<&[String], Error> {
        Ok(&self.parsed_listing()?.targets)
    }

    pub fn configurations(&mut self) -> Result<&[String], Error> {
        Ok(&self.parsed_listing()?.configurations)
    }

    /// Resolves the scheme selection, filling `options.scheme`.
    ///
    /// A preset scheme is verified against the listing and cleared with a
    /// diagnostic when unknown. An unset selection then resolves by:
    /// exactly one scheme, auto-selected; several schemes narrowed to one
    /// by `preferred_to_include` (case-insensitive containment); the
    /// scheme matching the project name when automated selection is
    /// switched on; otherwise a hard error under CI, or an interactive
    /// choice. No schemes at all is fatal.
    pub fn select_scheme(
        &mut self,
        preferred_to_include: Option<&str>,
        env: &EnvFlags,
        prompter: &dyn Prompter,
    ) -> Result<String, Error> {
        if let Some(preset) = self.options.scheme.clone().filter(|s| !s.is_empty()) {
            if self.schemes()?.contains(&preset) {
                return Ok(preset);
            }
            error!("Couldn't find specified scheme '{preset}'.");
            self.options.scheme = None;
        }

        let schemes = self.schemes()?.to_vec();
        match schemes.len() {
            0 => {
                self.shared_scheme_guidance();
                Err(Error::NoSchemes)
            }
            1 => {
                self.options.scheme = Some(schemes[0].clone());
                Ok(schemes[0].clone())
            }
            _ => {
                if let Some(preferred) = preferred_to_include {
                    let needle = preferred.to_lowercase();
                    let matching: Vec<&String> = schemes
                        .iter()
                        .filter(|scheme| scheme.to_lowercase().contains(&needle))
                        .collect();
                    if matching.len() == 1 {
                        let chosen = matching[0].clone();
                        self.options.scheme = Some(chosen.clone());
                        return Ok(chosen);
                    }
                }

                let project_name = self.project_name();
                if env.automated_scheme_selection && schemes.contains(&project_name) {
                    info!("Using scheme matching project name ({project_name}).");
                    self.options.scheme = Some(project_name.clone());
                    return Ok(project_name);
                }

                if env.ci {
                    error!("Multiple schemes found but you haven't specified one.");
                    error!("Since this is a CI, please pass one using the `scheme` option");
                    self.shared_scheme_guidance();
                    return Err(Error::AmbiguousScheme);
                }

                let chosen = prompter.choose("Select Scheme:", &schemes)?;
                self.options.scheme = Some(chosen.clone());
                Ok(chosen)
            }
        }
    }

    fn shared_scheme_guidance(&self) {
        error!(
            "Couldn't find any schemes in this project, make sure the scheme is shared if you are using a workspace"
        );
        error!(
            "Open Xcode, click on `Manage Schemes` and check the `Shared` box for the schemes you want to use"
        );
        error!("Afterwards make sure to commit the changes into version control");
    }

    /// Best-effort build-setting lookup.
    ///
    /// `target` defaults to the first listed target. The settings table is
    /// computed lazily through the toolchain (at most once per model); a
    /// failing invocation propagates, but a missing target, missing key,
    /// or empty target list is a plain miss. With `optional == false` the
    /// miss is reported at error level - still returning `Ok(None)`, since
    /// metadata lookups must never abort a build.
    pub fn build_settings(
        &mut self,
        key: &str,
        target: Option<&str>,
        optional: bool,
    ) -> Result<Option<String>, Error> {
        let target = match target {
            Some(target) => Some(target.to_string()),
            None => self.targets()?.first().cloned(),
        };

        let table = self.parsed_settings()?;
        let value = target
            .as_deref()
            .and_then(|target| table.get(target))
            .and_then(|block| scan_block(block, key));

        if value.is_none() && !optional {
            error!("Could not fetch {key} from project settings");
        }
        Ok(value)
    }

    /// Like [`Self::build_settings`], but first defaults the scheme for
    /// workspaces, where the settings invocation is scoped by scheme.
    pub fn default_build_settings(
        &mut self,
        key: &str,
        optional: bool,
    ) -> Result<Option<String>, Error> {
        if self.is_workspace && self.options.scheme.is_none() {
            self.options.scheme = self.schemes()?.first().cloned();
        }
        self.build_settings(key, None, optional)
    }

    /// Bundle identifier of the default target, defaulting the scheme
    /// first.
    pub fn default_app_identifier(&mut self) -> Result<Option<String>, Error> {
        self.default_build_settings("PRODUCT_BUNDLE_IDENTIFIER", true)
    }

    /// Product name of the default target.
    pub fn default_app_name(&mut self) -> Result<Option<String>, Error> {
        if self.is_workspace {
            self.default_build_settings("PRODUCT_NAME", true)
        } else {
            Ok(Some(self.app_name()?))
        }
    }

    /// `WRAPPER_NAME` with the `WRAPPER_SUFFIX` removed, e.g.
    /// `Example.app` -> `Example`. Falls back to `"App"`.
    pub fn app_name(&mut self) -> Result<String, Error> {
        match self.build_settings("WRAPPER_NAME", None, true)? {
            Some(name) => match self.build_settings("WRAPPER_SUFFIX", None, true)? {
                Some(suffix) if !suffix.is_empty() => Ok(name.replace(&suffix, "")),
                _ => Ok(name),
            },
            None => Ok("App".to_string()),
        }
    }

    pub fn product_type(&mut self, target: Option<&str>) -> Result<Option<ProductType>, Error> {
        Ok(self
            .build_settings("PRODUCT_TYPE", target, true)?
            .and_then(|identifier| ProductType::from_identifier(&identifier)))
    }

    pub fn is_application(&mut self, target: Option<&str>) -> Result<bool, Error> {
        Ok(self.product_type(target)? == Some(ProductType::Application))
    }

    /// Unit-test or ui-testing bundle, judged by product type only.
    /// Signing-time test-target detection widens this check; see
    /// the signing module.
    pub fn is_test(&mut self, target: Option<&str>) -> Result<bool, Error> {
        Ok(self
            .product_type(target)?
            .is_some_and(|product| product.is_test_bundle()))
    }

    pub fn is_dynamic_library(&mut self) -> Result<bool, Error> {
        Ok(self.product_type(None)? == Some(ProductType::DynamicLibrary))
    }

    pub fn is_static_library(&mut self) -> Result<bool, Error> {
        Ok(self.product_type(None)? == Some(ProductType::StaticLibrary))
    }

    pub fn is_library(&mut self) -> Result<bool, Error> {
        Ok(self.is_static_library()? || self.is_dynamic_library()?)
    }

    pub fn is_framework(&mut self) -> Result<bool, Error> {
        Ok(self.product_type(None)? == Some(ProductType::Framework))
    }

    pub fn is_command_line_tool(&mut self) -> Result<bool, Error> {
        Ok(self.product_type(None)? == Some(ProductType::CommandLineTool))
    }

    /// Frameworks and libraries are built in place; everything else goes
    /// through an archive step.
    pub fn produces_archive(&mut self) -> Result<bool, Error> {
        Ok(!(self.is_framework()? || self.is_static_library()? || self.is_dynamic_library()?))
    }

    fn platform_name(&mut self) -> Result<Option<String>, Error> {
        self.build_settings("PLATFORM_NAME", None, true)
    }

    pub fn is_ios_app(&mut self) -> Result<bool, Error> {
        Ok(self.is_application(None)? && self.platform_name()?.as_deref() == Some("iphoneos"))
    }

    pub fn is_mac_app(&mut self) -> Result<bool, Error> {
        Ok(self.is_application(None)? && self.platform_name()?.as_deref() == Some("macosx"))
    }

    pub fn is_ios_framework(&mut self) -> Result<bool, Error> {
        Ok(self.is_framework()? && self.platform_name()?.as_deref() == Some("iphoneos"))
    }

    pub fn is_mac_framework(&mut self) -> Result<bool, Error> {
        Ok(self.is_framework()? && self.platform_name()?.as_deref() == Some("macosx"))
    }

    pub fn is_ios_library(&mut self) -> Result<bool, Error> {
        Ok(self.is_library()? && self.platform_name()?.as_deref() == Some("iphoneos"))
    }

    pub fn is_mac_library(&mut self) -> Result<bool, Error> {
        Ok(self.is_library()? && self.platform_name()?.as_deref() == Some("macosx"))
    }

    /// Platforms from `SUPPORTED_PLATFORMS`, deduplicated in first-seen
    /// order, unknown tokens dropped. An absent setting falls back to
    /// iOS-only with a warning; old project files simply do not carry it.
    pub fn supported_platforms(&mut self) -> Result<Vec<Platform>, Error> {
        let Some(raw) = self.build_settings("SUPPORTED_PLATFORMS", None, true)? else {
            warn!(
                "Could not read the \"SUPPORTED_PLATFORMS\" build setting, assuming that the project supports iOS only."
            );
            return Ok(vec![Platform::Ios]);
        };

        let mut platforms = Vec::new();
        for token in raw.split_whitespace() {
            if let Some(platform) = Platform::from_sdk_token(token) {
                if !platforms.contains(&platform) {
                    platforms.push(platform);
                }
            }
        }
        Ok(platforms)
    }

    pub fn supports_ios(&mut self) -> Result<bool, Error> {
        Ok(self.supported_platforms()?.contains(&Platform::Ios))
    }

    pub fn supports_mac(&mut self) -> Result<bool, Error> {
        Ok(self.supported_platforms()?.contains(&Platform::MacOs))
    }

    pub fn supports_tvos(&mut self) -> Result<bool, Error> {
        Ok(self.supported_platforms()?.contains(&Platform::TvOs))
    }

    pub fn supports_ios_or_tvos(&mut self) -> Result<bool, Error> {
        Ok(self.supports_ios()? || self.supports_tvos()?)
    }

    fn parsed_listing(&mut self) -> Result<&Listing, Error> {
        if self.listing.is_none() {
            let raw = self.runner.list(&self.options)?;
            self.listing = Some(Listing::parse(&raw));
        }
        Ok(self.listing.as_ref().unwrap())
    }

    fn parsed_settings(&mut self) -> Result<&SettingsTable, Error> {
        if self.settings.is_none() {
            let raw = self.runner.show_build_settings(&self.options)?;
            self.settings = Some(SettingsTable::parse(&raw));
        }
        Ok(self.settings.as_ref().unwrap())
    }
}

/// Finds `key` in a raw settings block: the line whose left-hand side of
/// the first ` = ` (trimmed) equals the key; the right-hand side is
/// returned trimmed.
fn scan_block(block: &str, key: &str) -> Option<String> {
    block.lines().find_map(|line| {
        let (lhs, rhs) = line.split_once(" = ")?;
        (lhs.trim() == key).then(|| rhs.trim().to_string())
    })
}
