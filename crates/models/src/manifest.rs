use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One parsed requirement line: the package name plus the raw line it came
/// from, so rendering the manifest back out preserves pins and markers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ManifestLine {
    Requirement(Requirement),
    /// Comments and blank lines, kept verbatim.
    Passthrough(String),
}

/// An ordered dependency manifest (`requirements.txt` format). Filtering
/// removes requirements by parsed package name, never by raw text matching,
/// and is idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyManifest {
    lines: Vec<ManifestLine>,
}

impl DependencyManifest {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    ManifestLine::Passthrough(line.to_string())
                } else {
                    ManifestLine::Requirement(Requirement {
                        name: requirement_name(trimmed),
                        raw: line.to_string(),
                    })
                }
            })
            .collect();
        Self { lines }
    }

    pub fn requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.lines.iter().filter_map(|line| match line {
            ManifestLine::Requirement(req) => Some(req),
            ManifestLine::Passthrough(_) => None,
        })
    }

    pub fn requirement_count(&self) -> usize {
        self.requirements().count()
    }

    /// Remove every requirement whose package name is in `exclusions`,
    /// keeping order and passthrough lines untouched.
    pub fn filter(&self, exclusions: &ExclusionSet) -> Self {
        let lines = self
            .lines
            .iter()
            .filter(|line| match line {
                ManifestLine::Requirement(req) => !exclusions.contains(&req.name),
                ManifestLine::Passthrough(_) => true,
            })
            .cloned()
            .collect();
        Self { lines }
    }

    /// Names removed by filtering with `exclusions`, in manifest order.
    pub fn excluded_names(&self, exclusions: &ExclusionSet) -> Vec<String> {
        self.requirements()
            .filter(|req| exclusions.contains(&req.name))
            .map(|req| req.name.clone())
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                ManifestLine::Requirement(req) => out.push_str(&req.raw),
                ManifestLine::Passthrough(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }
}

/// Declarative set of package identifiers to drop from a manifest. Names are
/// normalized the way package indexes normalize them (case-insensitive,
/// `-`/`_`/`.` runs collapse to `-`), so `Foo_Bar` and `foo.bar` match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| normalize_name(name.as_ref()))
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize_name(name))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Package name prefix of a requirement line: everything up to the first
/// version specifier, extras bracket, or environment marker.
fn requirement_name(line: &str) -> String {
    let end = line
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';' | ' ' | '\t' | '#'))
        .unwrap_or(line.len());
    line[..end].trim().to_string()
}

fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_was_sep {
                out.push('-');
            }
            last_was_sep = true;
        } else {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        }
    }
    out
}
