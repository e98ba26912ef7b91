//! Provisioning-profile mapping detection and merging.
//!
//! Two independently-sourced mappings exist per build: the *primary* one
//! the caller already resolved (e.g. through a signing service) and the
//! *secondary* one detected from the project files on disk. This module
//! merges them under a deterministic, export-method-keyed precedence
//! policy and implements the detection side.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, error};

use crate::listing::Listing;
use crate::project::{Project, ProjectOptions};
use crate::toolchain::version_at_least;
use crate::types::Error;

/// Bundle identifier -> provisioning profile reference.
///
/// A `BTreeMap` keeps iteration deterministic, which keeps merge logs and
/// serialized output stable.
pub type ProfileMapping = BTreeMap<String, String>;

/// Detection on newer toolchains is known to be unreliable, so failures
/// there are surfaced instead of silently swallowed.
const UNRELIABLE_DETECTION_VERSION: &str = "9.0";

/// Canonical key form applied on ingestion at every mapping boundary, so
/// differently-sourced keys unify on string identity.
fn canonical_key(key: &str) -> String {
    key.trim().to_string()
}

/// Compares app identifiers and profile names loosely: both sides are
/// lowercased with `-` and ` ` stripped before a substring containment
/// test. Profile names usually mention their export method, but with
/// varying notation (`AppStore`, `app-store`, `Ad Hoc`).
pub fn app_identifier_contains(value: &str, needle: &str) -> bool {
    fn normalize(s: &str) -> String {
        s.replace('-', "").replace(' ', "").to_lowercase()
    }
    normalize(value).contains(&normalize(needle))
}

/// Merges the detected (`secondary`) mapping into the caller-supplied
/// (`primary`) one.
///
/// Per bundle identifier:
///
/// 1. Only one side knows it -> that value is used.
/// 2. Both sides know it and the primary value matches `export_method` ->
///    the primary value stays, whether or not the secondary matches too.
/// 3. Otherwise, the secondary value wins: either it is the only side
///    matching the export method, or neither side matches and the freshly
///    detected project value is preferred over a possibly stale primary
///    one.
///
/// The policy is asymmetric and order-dependent only in the
/// neither-matches case; keep it exactly this way around.
pub fn merge_profile_mapping(
    primary: Option<&ProfileMapping>,
    secondary: &ProfileMapping,
    export_method: &str,
) -> ProfileMapping {
    let mut merged: ProfileMapping = primary
        .map(|mapping| {
            mapping
                .iter()
                .map(|(key, value)| (canonical_key(key), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    for (bundle_id, profile) in secondary {
        let bundle_id = canonical_key(bundle_id);
        match merged.get(&bundle_id) {
            None => {
                merged.insert(bundle_id, profile.clone());
            }
            Some(existing) if app_identifier_contains(existing, export_method) => {
                // Primary names the right export method; it wins even when
                // the secondary matches as well.
            }
            Some(_) if app_identifier_contains(profile, export_method) => {
                merged.insert(bundle_id, profile.clone());
            }
            Some(_) => {
                // Neither side matches: take the freshly detected value.
                merged.insert(bundle_id, profile.clone());
            }
        }
    }

    debug!("merging provisioning profile mappings");
    debug!("primary: {primary:?}");
    debug!("secondary: {secondary:?}");
    debug!("result: {merged:?}");

    merged
}

/// Detects and merges provisioning-profile mappings for one project
/// model.
pub struct SigningResolver<'a> {
    project: &'a mut Project,
    project_paths: Option<Vec<PathBuf>>,
}

impl<'a> SigningResolver<'a> {
    pub fn new(project: &'a mut Project) -> Self {
        SigningResolver {
            project,
            project_paths: None,
        }
    }

    /// Merged mapping for the given export method.
    ///
    /// When `secondary` is not supplied it defaults to
    /// [`Self::detect_project_profile_mapping`].
    pub fn merged_mapping(
        &mut self,
        primary: Option<&ProfileMapping>,
        secondary: Option<ProfileMapping>,
        export_method: &str,
    ) -> Result<ProfileMapping, Error> {
        let secondary = match secondary {
            Some(secondary) => secondary,
            None => self.detect_project_profile_mapping()?,
        };
        Ok(merge_profile_mapping(primary, &secondary, export_method))
    }

    /// Paths to all underlying project files (several for a workspace).
    ///
    /// A single project is its own only entry. For a workspace the
    /// signing-relevant information lives in the referenced projects, so
    /// every `group:"…"` reference in `contents.xcworkspacedata` is
    /// resolved against the workspace's parent directory. The CocoaPods
    /// aggregate (`Pods/Pods.xcodeproj`) carries no signing-relevant
    /// targets and is dropped.
    pub fn project_paths(&mut self) -> Result<&[PathBuf], Error> {
        if self.project_paths.is_none() {
            self.project_paths = Some(self.scan_project_paths()?);
        }
        Ok(self.project_paths.as_deref().unwrap())
    }

    fn scan_project_paths(&self) -> Result<Vec<PathBuf>, Error> {
        if !self.project.is_workspace() {
            return Ok(vec![self.project.path().to_path_buf()]);
        }

        let data_path = self.project.path().join("contents.xcworkspacedata");
        let data = fs::read_to_string(&data_path)?;
        let base = self
            .project
            .path()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        // The workspace data file is XML-ish, but only the group references
        // matter; a pattern match keeps us off a full XML parser.
        let reference = Regex::new(r#""group:([^"]*)""#).unwrap();
        Ok(reference
            .captures_iter(&data)
            .map(|captures| base.join(&captures[1]))
            .filter(|path| !path.ends_with("Pods/Pods.xcodeproj"))
            .collect())
    }

    /// Scrapes per-target provisioning-profile assignments from the
    /// underlying projects.
    ///
    /// Targets whose settings carry a non-empty `TEST_TARGET_NAME` or
    /// `TEST_HOST` are skipped; test bundles are never shipped under their
    /// own profile. For each remaining target the profile *specifier* is
    /// preferred over the profile UUID, keyed by bundle identifier. A
    /// failure on one project never aborts the others; on toolchains at or
    /// above 9.0 it is additionally reported, because silent partial
    /// detection is misleading there.
    pub fn detect_project_profile_mapping(&mut self) -> Result<ProfileMapping, Error> {
        let configuration = match self.project.options().configuration.clone() {
            Some(configuration) => Some(configuration),
            None => self.project.default_build_settings("CONFIGURATION", true)?,
        };

        let mut mapping = ProfileMapping::new();
        for project_path in self.project_paths()?.to_vec() {
            debug!(
                "parsing project file '{}' to find selected provisioning profiles",
                project_path.display()
            );
            if let Some(configuration) = &configuration {
                debug!("finding provisioning profiles for '{configuration}'");
            }

            match self.detect_one_project(&project_path, &mut mapping) {
                Ok(duplicates) if !duplicates.is_empty() => {
                    error!("Couldn't automatically detect the provisioning profile mapping");
                    error!(
                        "There were multiple profiles for bundle identifier(s): {}",
                        duplicates.join(", ")
                    );
                    error!(
                        "You need to provide an explicit mapping of what provisioning profile to use for each bundle identifier of your app"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(
                        "profile detection failed for '{}': {err}",
                        project_path.display()
                    );
                    if self.detection_is_unreliable() {
                        error!("Couldn't automatically detect the provisioning profile mapping");
                        error!(
                            "On this toolchain you need to provide an explicit mapping of what provisioning profile to use for each target of your app"
                        );
                        error!("{err}");
                    }
                }
            }
        }

        Ok(mapping)
    }

    /// One project's contribution to the mapping. Returns the bundle
    /// identifiers that were assigned more than once, for diagnostics.
    fn detect_one_project(
        &mut self,
        project_path: &Path,
        mapping: &mut ProfileMapping,
    ) -> Result<Vec<String>, Error> {
        let sub_options = ProjectOptions {
            project: Some(project_path.to_path_buf()),
            suppress_stderr: self.project.options().suppress_stderr,
            ..ProjectOptions::default()
        };
        let raw = self.project.runner().list(&sub_options)?;
        let targets = Listing::parse(&raw).targets;

        let mut duplicates = Vec::new();
        for target in targets {
            if self.is_test_target(&target)? {
                continue;
            }

            let Some(bundle_id) = self
                .project
                .build_settings("PRODUCT_BUNDLE_IDENTIFIER", Some(&target), true)?
            else {
                continue;
            };

            let specifier = self
                .project
                .build_settings("PROVISIONING_PROFILE_SPECIFIER", Some(&target), true)?;
            let uuid = self
                .project
                .build_settings("PROVISIONING_PROFILE", Some(&target), true)?;
            let profile = specifier
                .filter(|value| !value.is_empty())
                .or_else(|| uuid.filter(|value| !value.is_empty()));

            let Some(profile) = profile else { continue };
            let key = canonical_key(&bundle_id);
            if mapping.insert(key.clone(), profile).is_some() && !duplicates.contains(&key) {
                duplicates.push(key);
            }
        }

        Ok(duplicates)
    }

    /// Signing-time test-target check: a non-empty `TEST_TARGET_NAME` or
    /// `TEST_HOST` marks a test target. Wider than the product-type test
    /// check on [`Project`]; unit-test hosts set these without carrying a
    /// test bundle product type.
    pub fn is_test_target(&mut self, target: &str) -> Result<bool, Error> {
        let name = self
            .project
            .build_settings("TEST_TARGET_NAME", Some(target), true)?;
        if name.is_some_and(|value| !value.is_empty()) {
            return Ok(true);
        }
        let host = self.project.build_settings("TEST_HOST", Some(target), true)?;
        Ok(host.is_some_and(|value| !value.is_empty()))
    }

    fn detection_is_unreliable(&self) -> bool {
        self.project
            .runner()
            .version()
            .map(|version| version_at_least(&version, UNRELIABLE_DETECTION_VERSION))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Project, ProjectOptions};
    use crate::toolchain::ToolchainRunner;
    use tempfile::TempDir;

    fn mapping(entries: &[(&str, &str)]) -> ProfileMapping {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn contains_strips_separators_and_case() {
        assert!(app_identifier_contains("Ad-HocValue", "ad-hoc"));
        assert!(app_identifier_contains("FuLL-StRing Yo", "fullstringyo"));
        assert!(!app_identifier_contains("dsfsdsdf", "somethingelse"));
    }

    #[test]
    fn merge_takes_either_side_when_no_conflict() {
        let primary = mapping(&[("identifier.1", "value.1")]);
        let secondary = mapping(&[("identifier.2", "value.2")]);
        let merged = merge_profile_mapping(Some(&primary), &secondary, "app-store");
        assert_eq!(
            merged,
            mapping(&[("identifier.1", "value.1"), ("identifier.2", "value.2")])
        );
    }

    #[test]
    fn merge_handles_empty_and_missing_sides() {
        let secondary = mapping(&[("identifier.1", "value.1")]);
        assert_eq!(
            merge_profile_mapping(None, &secondary, "app-store"),
            secondary
        );
        assert_eq!(
            merge_profile_mapping(Some(&ProfileMapping::new()), &secondary, "app-store"),
            secondary
        );
        let primary = mapping(&[("identifier.1", "value.1")]);
        assert_eq!(
            merge_profile_mapping(Some(&primary), &ProfileMapping::new(), "app-store"),
            primary
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let side = mapping(&[("identifier.1", "value.1"), ("identifier.2", "value.2")]);
        for method in ["app-store", "ad-hoc", "development"] {
            assert_eq!(merge_profile_mapping(Some(&side), &side, method), side);
        }
    }

    #[test]
    fn conflict_prefers_primary_when_both_match_the_method() {
        let primary = mapping(&[("identifier.1", "Ap-pStoreValue2")]);
        let secondary = mapping(&[("identifier.1", "Ap-pStoreValue1")]);
        let merged = merge_profile_mapping(Some(&primary), &secondary, "app-store");
        assert_eq!(merged, mapping(&[("identifier.1", "Ap-pStoreValue2")]));
    }

    #[test]
    fn conflict_keeps_primary_when_only_it_matches() {
        let primary = mapping(&[("identifier.1", "Ap-p StoreValue1")]);
        let secondary = mapping(&[("identifier.1", "Ad-HocValue")]);
        let merged = merge_profile_mapping(Some(&primary), &secondary, "app-store");
        assert_eq!(merged, mapping(&[("identifier.1", "Ap-p StoreValue1")]));
    }

    #[test]
    fn conflict_takes_secondary_when_only_it_matches() {
        let primary = mapping(&[("identifier.1", "Ap-p StoreValue1")]);
        let secondary = mapping(&[("identifier.1", "Ad-HocValue")]);
        let merged = merge_profile_mapping(Some(&primary), &secondary, "ad-hoc");
        assert_eq!(merged, mapping(&[("identifier.1", "Ad-HocValue")]));
    }

    #[test]
    fn conflict_takes_secondary_when_neither_matches() {
        let primary = mapping(&[("identifier.1", "AppStore")]);
        let secondary = mapping(&[("identifier.1", "Adhoc")]);
        let merged = merge_profile_mapping(Some(&primary), &secondary, "development");
        assert_eq!(merged, mapping(&[("identifier.1", "Adhoc")]));
    }

    #[test]
    fn keys_are_canonicalized_on_ingestion() {
        let primary = mapping(&[("  identifier.1 ", "Ap-pStoreValue2")]);
        let secondary = mapping(&[("identifier.1", "Ap-pStoreValue1")]);
        let merged = merge_profile_mapping(Some(&primary), &secondary, "app-store");
        assert_eq!(merged, mapping(&[("identifier.1", "Ap-pStoreValue2")]));
    }

    /// Per-path canned listings, one shared settings table.
    struct MultiProjectRunner {
        main_list: String,
        sub_lists: Vec<(PathBuf, Result<String, ()>)>,
        settings_output: String,
        version: String,
    }

    impl ToolchainRunner for MultiProjectRunner {
        fn list(&self, options: &ProjectOptions) -> Result<String, Error> {
            if let Some(path) = options.project_path() {
                for (sub_path, output) in &self.sub_lists {
                    if path == sub_path {
                        return match output {
                            Ok(text) => Ok(text.clone()),
                            Err(()) => Err(Error::ToolchainFailed {
                                command: format!("xcodebuild -list -project {}", path.display()),
                                status: 70,
                            }),
                        };
                    }
                }
            }
            Ok(self.main_list.clone())
        }

        fn show_build_settings(&self, _options: &ProjectOptions) -> Result<String, Error> {
            Ok(self.settings_output.clone())
        }

        fn version(&self) -> Result<String, Error> {
            Ok(self.version.clone())
        }
    }

    fn workspace_fixture(dir: &TempDir, data: &str) -> PathBuf {
        let workspace = dir.path().join("Example.xcworkspace");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("contents.xcworkspacedata"), data).unwrap();
        workspace
    }

    const WORKSPACE_DATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Workspace version = "1.0">
   <FileRef location = "group:App/App.xcodeproj"></FileRef>
   <FileRef location = "group:Pods/Pods.xcodeproj"></FileRef>
</Workspace>
"#;

    #[test]
    fn workspace_paths_drop_the_pods_aggregate() {
        let dir = TempDir::new().unwrap();
        let workspace = workspace_fixture(&dir, WORKSPACE_DATA);
        let options = ProjectOptions {
            workspace: Some(workspace),
            ..ProjectOptions::default()
        };
        let runner = MultiProjectRunner {
            main_list: "Schemes:\n    Example\n".to_string(),
            sub_lists: Vec::new(),
            settings_output: String::new(),
            version: "15.2".to_string(),
        };
        let mut project = Project::new(options, Box::new(runner)).unwrap();
        let mut resolver = SigningResolver::new(&mut project);
        let paths = resolver.project_paths().unwrap();
        assert_eq!(paths, [dir.path().join("App/App.xcodeproj")]);
    }

    #[test]
    fn single_project_is_its_own_path_list() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("App.xcodeproj");
        std::fs::create_dir_all(&bundle).unwrap();
        let options = ProjectOptions {
            project: Some(bundle.clone()),
            ..ProjectOptions::default()
        };
        let runner = MultiProjectRunner {
            main_list: String::new(),
            sub_lists: Vec::new(),
            settings_output: String::new(),
            version: "15.2".to_string(),
        };
        let mut project = Project::new(options, Box::new(runner)).unwrap();
        let mut resolver = SigningResolver::new(&mut project);
        assert_eq!(resolver.project_paths().unwrap(), [bundle]);
    }

    const DETECTION_SETTINGS: &str = concat!(
        "Build settings for action build and target App:\n",
        "    PRODUCT_BUNDLE_IDENTIFIER = family.wwdc.app\n",
        "    PROVISIONING_PROFILE_SPECIFIER = match AppStore family.wwdc.app\n",
        "    PROVISIONING_PROFILE = 12345-abcde\n",
        "\n",
        "Build settings for action build and target AppTests:\n",
        "    PRODUCT_BUNDLE_IDENTIFIER = family.wwdc.app.tests\n",
        "    TEST_HOST = $(BUILT_PRODUCTS_DIR)/App.app/App\n",
        "    PROVISIONING_PROFILE_SPECIFIER = match Development family.wwdc.app.tests\n",
        "\n",
        "Build settings for action build and target Widget:\n",
        "    PRODUCT_BUNDLE_IDENTIFIER = family.wwdc.app.widget\n",
        "    PROVISIONING_PROFILE = 99999-fffff\n",
        "\n",
        "Build settings for action build and target Helper:\n",
        "    PRODUCT_BUNDLE_IDENTIFIER = family.wwdc.app.helper\n",
    );

    fn detection_project(dir: &TempDir, sub_lists: Vec<(PathBuf, Result<String, ()>)>) -> Project {
        let workspace = workspace_fixture(dir, WORKSPACE_DATA);
        let options = ProjectOptions {
            workspace: Some(workspace),
            configuration: Some("Release".to_string()),
            ..ProjectOptions::default()
        };
        let runner = MultiProjectRunner {
            main_list: "Schemes:\n    Example\n".to_string(),
            sub_lists,
            settings_output: DETECTION_SETTINGS.to_string(),
            version: "15.2".to_string(),
        };
        Project::new(options, Box::new(runner)).unwrap()
    }

    #[test]
    fn detection_prefers_specifier_and_skips_test_targets() {
        let dir = TempDir::new().unwrap();
        let sub_path = dir.path().join("App/App.xcodeproj");
        let sub_list = "Targets:\n    App\n    AppTests\n    Widget\n    Helper\n".to_string();
        let mut project = detection_project(&dir, vec![(sub_path, Ok(sub_list))]);
        let mut resolver = SigningResolver::new(&mut project);

        let detected = resolver.detect_project_profile_mapping().unwrap();
        assert_eq!(
            detected,
            mapping(&[
                // Specifier beats the UUID; the UUID is the fallback; a
                // target with neither contributes nothing.
                ("family.wwdc.app", "match AppStore family.wwdc.app"),
                ("family.wwdc.app.widget", "99999-fffff"),
            ])
        );
    }

    #[test]
    fn detection_swallows_per_project_failures() {
        let dir = TempDir::new().unwrap();
        let sub_path = dir.path().join("App/App.xcodeproj");
        let mut project = detection_project(&dir, vec![(sub_path, Err(()))]);
        let mut resolver = SigningResolver::new(&mut project);
        let detected = resolver.detect_project_profile_mapping().unwrap();
        assert!(detected.is_empty());
    }

    #[test]
    fn merged_mapping_defaults_to_detection() {
        let dir = TempDir::new().unwrap();
        let sub_path = dir.path().join("App/App.xcodeproj");
        let sub_list = "Targets:\n    App\n".to_string();
        let mut project = detection_project(&dir, vec![(sub_path, Ok(sub_list))]);
        let mut resolver = SigningResolver::new(&mut project);

        let primary = mapping(&[("family.wwdc.app", "match AdHoc family.wwdc.app")]);
        let merged = resolver
            .merged_mapping(Some(&primary), None, "app-store")
            .unwrap();
        // Only the detected value names app-store, so it replaces the
        // primary ad-hoc profile.
        assert_eq!(
            merged,
            mapping(&[("family.wwdc.app", "match AppStore family.wwdc.app")])
        );
    }

    #[test]
    fn test_target_detection_widens_beyond_product_type() {
        let dir = TempDir::new().unwrap();
        let settings = concat!(
            "Build settings for action build and target Hosted:\n",
            "    TEST_TARGET_NAME = App\n",
            "\n",
            "Build settings for action build and target Plain:\n",
            "    PRODUCT_TYPE = com.apple.product-type.application\n",
        );
        let bundle = dir.path().join("App.xcodeproj");
        std::fs::create_dir_all(&bundle).unwrap();
        let options = ProjectOptions {
            project: Some(bundle),
            ..ProjectOptions::default()
        };
        let runner = MultiProjectRunner {
            main_list: "Targets:\n    Hosted\n    Plain\n".to_string(),
            sub_lists: Vec::new(),
            settings_output: settings.to_string(),
            version: "15.2".to_string(),
        };
        let mut project = Project::new(options, Box::new(runner)).unwrap();
        let mut resolver = SigningResolver::new(&mut project);
        assert!(resolver.is_test_target("Hosted").unwrap());
        assert!(!resolver.is_test_target("Plain").unwrap());
    }
}
