//! Parser for the toolchain's `-showBuildSettings` text output.

use std::collections::HashMap;

use regex::Regex;

/// Per-target raw settings blocks from a `-showBuildSettings` invocation.
///
/// The output is one section per target, separated by blank lines:
///
/// ```text
/// Build settings for action build and target target_A:
///     ACTION = build
///     PRODUCT_BUNDLE_IDENTIFIER = com.sample.target.a
///
/// Build settings for action build and target "target B":
///     ACTION = build
/// ```
///
/// Each matching section is stored verbatim (header line included) under
/// its target name, with surrounding quotes stripped. Sections that do not
/// carry the header - toolchain banners, trailing hints - are skipped.
#[derive(Debug, Clone, Default)]
pub struct SettingsTable {
    blocks: HashMap<String, String>,
}

impl SettingsTable {
    /// Parses raw `-showBuildSettings` output.
    ///
    /// Sections are split on lines that are entirely empty - not merely
    /// whitespace - so an indented blank line stays inside its section.
    /// The separator's newline attaches to the start of the following
    /// section, which therefore may begin with `\n`. A later section for
    /// an already-seen target overwrites the earlier block.
    pub fn parse(output: &str) -> Self {
        let header = Regex::new(r#"Build settings for action .+? and target "?(.+?)"?:"#).unwrap();

        let mut blocks = HashMap::new();
        for section in split_on_empty_lines(output) {
            if let Some(captures) = header.captures(&section) {
                blocks.insert(captures[1].to_string(), section);
            }
        }

        SettingsTable { blocks }
    }

    /// Returns the raw settings block for `target`, header included.
    pub fn get(&self, target: &str) -> Option<&str> {
        self.blocks.get(target).map(String::as_str)
    }

    /// Target names with a stored block, in no particular order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Splits at every entirely-empty line, attaching the separator newline to
/// the start of the next piece.
fn split_on_empty_lines(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();

    for chunk in text.split_inclusive('\n') {
        if chunk == "\n" || chunk == "\r\n" {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(chunk);
    }
    sections.push(current);

    sections
}
