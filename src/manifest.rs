//! Project Manifest Lookup
//!
//! Reads name and version from the nearest `Cargo.toml` so generators can
//! identify the root project. The pair scopes the home-directory defaults
//! document and feeds application-name determination.

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ManifestFile {
    package: Option<PackageSection>,
}

#[derive(Debug, Deserialize)]
struct PackageSection {
    name: Option<String>,
    version: Option<String>,
}

/// Name and version of the project a generator runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            name: "*".to_string(),
            version: "0.0.0".to_string(),
        }
    }
}

impl Manifest {
    /// Walk up from `dir` looking for a `Cargo.toml` with a package section.
    ///
    /// Falls back to the wildcard identity when no manifest is found or the
    /// file cannot be parsed.
    pub fn discover(dir: &Path) -> Self {
        for ancestor in dir.ancestors() {
            let candidate = ancestor.join("Cargo.toml");
            if !candidate.is_file() {
                continue;
            }
            match std::fs::read_to_string(&candidate) {
                Ok(raw) => match toml::from_str::<ManifestFile>(&raw) {
                    Ok(parsed) => {
                        if let Some(package) = parsed.package {
                            return Self {
                                name: package.name.unwrap_or_else(|| "*".to_string()),
                                version: package.version.unwrap_or_else(|| "0.0.0".to_string()),
                            };
                        }
                    }
                    Err(err) => {
                        debug!(path = %candidate.display(), error = %err, "Skipping unparseable manifest");
                    }
                },
                Err(err) => {
                    debug!(path = %candidate.display(), error = %err, "Skipping unreadable manifest");
                }
            }
        }
        Self::default()
    }

    /// Namespace under which cross-project defaults are stored:
    /// `<name>:<version>`.
    pub fn storage_scope(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

/// Determine the application name for a destination directory.
///
/// Prefers the manifest package name, then the directory basename;
/// non-word characters collapse to spaces either way.
pub fn app_name(root: &Path) -> String {
    let manifest = Manifest::discover(root);
    let raw = if manifest.name != "*" {
        manifest.name
    } else {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string())
    };

    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
