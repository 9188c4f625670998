//! Reading and rewriting the version declared in project manifests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use crate::version::SemVer;

/// Where a project declares its version.
pub trait VersionFileStore: Send + Sync {
    /// The version in the first manifest that declares one.
    fn read_current_version(&self) -> Result<SemVer>;

    /// Rewrites every manifest that declares a version; returns the files
    /// that changed, relative to the project root.
    fn write_version(&self, version: SemVer) -> Result<Vec<PathBuf>>;
}

/// Supported manifest kinds, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionFile {
    /// `version = "..."` in Cargo.toml.
    CargoToml,
    /// `"version": "..."` in package.json.
    PackageJson,
    /// `version = "..."` in pyproject.toml.
    PyProject,
    /// `version="..."` in setup.py.
    SetupPy,
    /// `__version__ = "..."` in `__init__.py`.
    InitPy,
}

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static CARGO_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^(version\s*=\s*")([^"]+)(")"#).unwrap());

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static PACKAGE_JSON_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^(\s*"version"\s*:\s*")([^"]+)(")"#).unwrap());

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static PYPROJECT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^(version\s*=\s*["'])([^"']+)(["'])"#).unwrap());

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static SETUP_PY_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\bversion\s*=\s*["'])([^"']+)(["'])"#).unwrap());

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static INIT_PY_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(__version__\s*=\s*["'])([^"']+)(["'])"#).unwrap());

impl VersionFile {
    /// Every kind, in lookup order.
    pub const ALL: [Self; 5] = [
        Self::CargoToml,
        Self::PackageJson,
        Self::PyProject,
        Self::SetupPy,
        Self::InitPy,
    ];

    /// File name relative to the project root.
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::CargoToml => "Cargo.toml",
            Self::PackageJson => "package.json",
            Self::PyProject => "pyproject.toml",
            Self::SetupPy => "setup.py",
            Self::InitPy => "__init__.py",
        }
    }

    /// Pattern whose second group is the version text.
    fn pattern(self) -> &'static Regex {
        match self {
            Self::CargoToml => &CARGO_VERSION,
            Self::PackageJson => &PACKAGE_JSON_VERSION,
            Self::PyProject => &PYPROJECT_VERSION,
            Self::SetupPy => &SETUP_PY_VERSION,
            Self::InitPy => &INIT_PY_VERSION,
        }
    }

    /// The declared version text, if any.
    pub fn find_version(self, content: &str) -> Option<&str> {
        self.pattern()
            .captures(content)
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str())
    }

    /// Replaces the first declaration with `version`.
    pub fn replace_version(self, content: &str, version: SemVer) -> String {
        self.pattern()
            .replacen(content, 1, |caps: &Captures<'_>| {
                format!("{}{version}{}", &caps[1], &caps[3])
            })
            .into_owned()
    }
}

struct PendingWrite {
    file: VersionFile,
    original: String,
    rewritten: String,
}

/// Version manifests on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsVersionStore {
    root: PathBuf,
}

impl FsVersionStore {
    /// Looks for manifests directly under `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Reads every declaring manifest and renders its new content.
    fn plan_update(&self, version: SemVer) -> Result<Vec<PendingWrite>> {
        let mut pending = Vec::new();
        for file in VersionFile::ALL {
            let Some(original) = self.read(file)? else {
                continue;
            };
            let rewritten = file.replace_version(&original, version);
            if rewritten != original {
                pending.push(PendingWrite {
                    file,
                    original,
                    rewritten,
                });
            }
        }
        Ok(pending)
    }

    /// Writes the planned contents. When one write fails, the files already
    /// written get their original content back before the error is returned.
    fn apply_update<W>(&self, pending: Vec<PendingWrite>, mut write: W) -> Result<Vec<PathBuf>>
    where
        W: FnMut(&Path, &str) -> io::Result<()>,
    {
        let mut written: Vec<PendingWrite> = Vec::new();
        for update in pending {
            let path = self.root.join(update.file.file_name());
            if let Err(e) = write(path.as_path(), update.rewritten.as_str()) {
                let restored = self.restore(&written, &mut write);
                return Err(e).with_context(|| {
                    format!(
                        "Failed to write {} (restored: {})",
                        path.display(),
                        if restored.is_empty() { "none".to_string() } else { restored.join(", ") }
                    )
                });
            }
            info!(file = update.file.file_name(), "Updated version file");
            written.push(update);
        }

        Ok(written
            .iter()
            .map(|update| PathBuf::from(update.file.file_name()))
            .collect())
    }

    fn restore<W>(&self, written: &[PendingWrite], write: &mut W) -> Vec<&'static str>
    where
        W: FnMut(&Path, &str) -> io::Result<()>,
    {
        let mut restored = Vec::new();
        for update in written {
            let name = update.file.file_name();
            match write(self.root.join(name).as_path(), update.original.as_str()) {
                Ok(()) => restored.push(name),
                Err(e) => warn!(file = name, "Could not restore version file: {e}"),
            }
        }
        restored
    }

    fn read(&self, file: VersionFile) -> Result<Option<String>> {
        let path = self.root.join(file.file_name());
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

impl VersionFileStore for FsVersionStore {
    fn read_current_version(&self) -> Result<SemVer> {
        for file in VersionFile::ALL {
            let Some(content) = self.read(file)? else {
                continue;
            };
            if let Some(text) = file.find_version(&content) {
                debug!(file = file.file_name(), version = text, "Found project version");
                return text
                    .parse()
                    .with_context(|| format!("Unsupported version in {}", file.file_name()));
            }
        }

        anyhow::bail!(
            "Could not find a version in any project file ({})",
            VersionFile::ALL.map(VersionFile::file_name).join(", ")
        )
    }

    fn write_version(&self, version: SemVer) -> Result<Vec<PathBuf>> {
        // nothing is written until every manifest has been read
        let pending = self.plan_update(version)?;
        let updated = self.apply_update(pending, |path, content| fs::write(path, content))?;
        debug!(%version, files = updated.len(), "Wrote version files");
        Ok(updated)
    }
}
