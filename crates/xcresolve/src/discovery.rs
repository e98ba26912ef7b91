//! Candidate project/workspace discovery in the working directory.
//!
//! When neither a project nor a workspace is configured, the working
//! directory is scanned for `.xcworkspace` bundles first (they wrap
//! projects, so they are the better entry point), then `.xcodeproj`
//! bundles. One match auto-selects; several prompt; none falls back to an
//! interactive path prompt.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use glob::glob;
use xcresolve_core::{ProjectOptions, Prompter};

/// Fills `options.project`/`options.workspace` when both are empty.
pub fn detect_projects(options: &mut ProjectOptions, prompter: &dyn Prompter) -> Result<()> {
    if options.project_path().is_some() && options.workspace_path().is_some() {
        bail!("you can only pass either a workspace or a project path, not both");
    }
    if options.project_path().is_some() {
        return Ok(());
    }

    if options.workspace_path().is_none() {
        if let Some(workspace) = pick_candidate("./*.xcworkspace", "Select Workspace:", prompter)? {
            options.workspace = Some(workspace);
        }
    }
    if options.workspace_path().is_some() {
        return Ok(());
    }

    if let Some(project) = pick_candidate("./*.xcodeproj", "Select Project:", prompter)? {
        options.project = Some(project);
        return Ok(());
    }

    prompt_for_path(options, prompter)
}

fn pick_candidate(
    pattern: &str,
    message: &str,
    prompter: &dyn Prompter,
) -> Result<Option<PathBuf>> {
    let mut candidates: Vec<String> = Vec::new();
    for entry in glob(pattern).context("invalid glob pattern")? {
        candidates.push(entry?.to_string_lossy().into_owned());
    }

    match candidates.len() {
        0 => Ok(None),
        1 => Ok(Some(PathBuf::from(&candidates[0]))),
        _ => {
            let chosen = prompter.choose(message, &candidates)?;
            Ok(Some(PathBuf::from(chosen)))
        }
    }
}

/// Asks for a path until a valid project or workspace bundle is given.
fn prompt_for_path(options: &mut ProjectOptions, prompter: &dyn Prompter) -> Result<()> {
    loop {
        let path = prompter.input(
            "Couldn't automatically detect the project file, please provide a path:",
        )?;
        let path = PathBuf::from(path.trim());

        if path.is_dir() {
            if has_extension(&path, "xcworkspace") {
                options.workspace = Some(path);
                return Ok(());
            } else if has_extension(&path, "xcodeproj") {
                options.project = Some(path);
                return Ok(());
            }
            tracing::error!("Path must end with either .xcworkspace or .xcodeproj");
        } else {
            tracing::error!("Couldn't find project at path '{}'", path.display());
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use xcresolve_core::Error;

    /// Replays a scripted sequence of prompt answers.
    struct ScriptedPrompter {
        answers: Mutex<Vec<String>>,
    }

    impl ScriptedPrompter {
        fn new(answers: &[&str]) -> Self {
            ScriptedPrompter {
                answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn choose(&self, _message: &str, _options: &[String]) -> Result<String, Error> {
            self.answers
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::Prompt("no scripted answer left".to_string()))
        }

        fn input(&self, _message: &str) -> Result<String, Error> {
            self.choose("", &[])
        }
    }

    struct CwdGuard(PathBuf);

    impl CwdGuard {
        fn enter(dir: &Path) -> Self {
            let previous = std::env::current_dir().unwrap();
            std::env::set_current_dir(dir).unwrap();
            CwdGuard(previous)
        }
    }

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    #[test]
    #[serial]
    fn picks_the_only_workspace_present() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Something.xcworkspace")).unwrap();
        let _guard = CwdGuard::enter(dir.path());

        let mut options = ProjectOptions::default();
        detect_projects(&mut options, &ScriptedPrompter::new(&[])).unwrap();
        assert!(options.workspace.is_some());
        assert!(options.project.is_none());
    }

    #[test]
    #[serial]
    fn picks_the_only_project_present() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Something.xcodeproj")).unwrap();
        let _guard = CwdGuard::enter(dir.path());

        let mut options = ProjectOptions::default();
        detect_projects(&mut options, &ScriptedPrompter::new(&[])).unwrap();
        assert!(options.project.is_some());
        assert!(options.workspace.is_none());
    }

    #[test]
    fn keeps_an_explicitly_given_project() {
        let mut options = ProjectOptions {
            project: Some(PathBuf::from("Given.xcodeproj")),
            ..ProjectOptions::default()
        };
        detect_projects(&mut options, &ScriptedPrompter::new(&[])).unwrap();
        assert_eq!(options.project, Some(PathBuf::from("Given.xcodeproj")));
    }

    #[test]
    fn rejects_both_kinds_at_once() {
        let mut options = ProjectOptions {
            project: Some(PathBuf::from("A.xcodeproj")),
            workspace: Some(PathBuf::from("B.xcworkspace")),
            ..ProjectOptions::default()
        };
        assert!(detect_projects(&mut options, &ScriptedPrompter::new(&[])).is_err());
    }

    #[test]
    #[serial]
    fn falls_back_to_an_interactive_path() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("sub/Something.xcworkspace");
        std::fs::create_dir_all(&bundle).unwrap();
        let _guard = CwdGuard::enter(dir.path());

        let answers = [
            "missing/Nope.xcodeproj".to_string(),
            bundle.to_string_lossy().into_owned(),
        ];
        let answers: Vec<&str> = answers.iter().map(String::as_str).collect();
        let mut options = ProjectOptions::default();
        detect_projects(&mut options, &ScriptedPrompter::new(&answers)).unwrap();
        assert_eq!(options.workspace, Some(bundle));
    }
}
