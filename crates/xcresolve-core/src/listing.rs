//! Parser for the toolchain's `-list` text output.

/// Targets, schemes, and configurations scraped from a `-list` invocation.
///
/// Order within each sequence is preserved from the input and is
/// significant: the first element is the default candidate during
/// resolution.
///
/// Two real-world shapes exist. A plain project prints all three section
/// headers; a workspace prints only `Schemes:`, in which case `targets`
/// and `configurations` stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub targets: Vec<String>,
    pub schemes: Vec<String>,
    pub configurations: Vec<String>,
}

/// The section a parsed line belongs to.
#[derive(Clone, Copy)]
enum Section {
    Targets,
    Schemes,
    Configurations,
}

impl Listing {
    /// Parses raw `-list` output.
    ///
    /// Lines are trimmed; a line exactly matching a known section header
    /// switches the current section, a blank line clears it, and any other
    /// line is appended to the active section. Content outside any section
    /// (the `Information about project ...` banner, hint lines after a
    /// blank) is discarded. Headers may appear in any order or be absent.
    pub fn parse(output: &str) -> Self {
        let mut listing = Listing::default();
        let mut current: Option<Section> = None;

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                current = None;
            } else if line == "Targets:" {
                current = Some(Section::Targets);
            } else if line == "Schemes:" {
                current = Some(Section::Schemes);
            } else if line == "Build Configurations:" {
                current = Some(Section::Configurations);
            } else if let Some(section) = current {
                let bucket = match section {
                    Section::Targets => &mut listing.targets,
                    Section::Schemes => &mut listing.schemes,
                    Section::Configurations => &mut listing.configurations,
                };
                bucket.push(line.to_string());
            }
        }

        listing
    }
}
