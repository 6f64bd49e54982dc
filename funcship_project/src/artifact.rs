// SPDX-License-Identifier: MIT
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::UnitError;

/// Largest archive the registry accepts for a direct code upload.
pub const MAX_ARCHIVE_BYTES: u64 = 50 * 1024 * 1024;

/// Inclusions added to the function's own sources.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Interpreter environment whose installed packages are flattened to
    /// the archive root.
    pub virtual_env: Option<PathBuf>,
    /// Extra library folders, flattened the same way; later folders win
    /// over earlier ones on collision.
    pub libraries: Vec<PathBuf>,
}

/// Deployable archive plus its content fingerprint. Identical source
/// trees and identical inclusion options yield identical bytes and an
/// identical fingerprint, independent of machine or timestamps.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    /// Hex SHA-256 over the sorted (path, content) set.
    pub fingerprint: String,
    pub files: usize,
    /// Inclusion entries that lost a collision against function sources.
    pub shadowed: Vec<String>,
}

impl Artifact {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn build(source_dir: &Path, options: &BuildOptions) -> Result<Artifact, UnitError> {
    if !source_dir.is_dir() {
        return Err(UnitError::SourceMissing(source_dir.to_path_buf()));
    }

    // Lowest precedence first: virtual environment, then libraries in
    // the order given (last wins), then function sources on top.
    let mut staged = std::collections::BTreeMap::<String, PathBuf>::new();
    let mut shadowed = Vec::new();

    if let Some(virtual_env) = &options.virtual_env {
        for (key, path) in collect_virtual_env(virtual_env)? {
            if let Some(previous) = staged.get(&key) {
                if !same_content(previous, &path)? {
                    return Err(UnitError::Conflict {
                        path: key,
                        first: previous.clone(),
                        second: path,
                    });
                }
            }
            staged.insert(key, path);
        }
    }

    for library in &options.libraries {
        if !library.is_dir() {
            return Err(UnitError::InclusionMissing(library.clone()));
        }
        for (key, path) in collect_inclusion(library)? {
            staged.insert(key, path);
        }
    }

    let sources = collect_sources(source_dir)?;
    if sources.is_empty() {
        return Err(UnitError::SourceEmpty(source_dir.to_path_buf()));
    }
    for (key, path) in sources {
        if staged.contains_key(&key) {
            log::warn!("inclusion entry {} shadowed by function source", key);
            shadowed.push(key.clone());
        }
        staged.insert(key, path);
    }

    // Fixed timestamps and permissions, entries in sorted relative-path
    // order: the archive bytes only depend on the staged content.
    let zip_options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let mut hasher = Sha256::new();
    let files = staged.len();
    for (key, path) in &staged {
        let content = std::fs::read(path)?;
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(&content);
        writer.start_file(key.as_str(), zip_options)?;
        writer.write_all(&content).map_err(UnitError::Io)?;
    }
    let bytes = writer.finish()?.into_inner();

    if bytes.len() as u64 > MAX_ARCHIVE_BYTES {
        return Err(UnitError::SizeLimit {
            size: bytes.len() as u64,
            limit: MAX_ARCHIVE_BYTES,
        });
    }

    Ok(Artifact {
        bytes,
        fingerprint: format!("{:x}", hasher.finalize()),
        files,
        shadowed,
    })
}

/// Files of the function's own source tree, keyed by '/'-separated
/// relative path. Build artifacts, caches and the tool's own
/// configuration are left out.
fn collect_sources(source_dir: &Path) -> Result<Vec<(String, PathBuf)>, UnitError> {
    let mut out = Vec::new();
    collect_tree(source_dir, source_dir, &mut out, &|name, path| {
        if path.is_dir() {
            !name.starts_with('.') && name != "__pycache__" && !path.join("pyvenv.cfg").exists()
        } else {
            !name.ends_with(".pyc")
                && !name.ends_with(".zip")
                && name != crate::config::PROJECT_CONFIG_FILE
                && !name.starts_with('.')
        }
    })?;
    Ok(out)
}

/// Files of an extra library folder.
fn collect_inclusion(dir: &Path) -> Result<Vec<(String, PathBuf)>, UnitError> {
    let mut out = Vec::new();
    collect_tree(dir, dir, &mut out, &|name, path| {
        if path.is_dir() {
            name != "__pycache__"
        } else {
            !name.ends_with(".pyc")
        }
    })?;
    Ok(out)
}

/// Installed packages of a virtual environment, flattened so they sit at
/// the archive root next to the handler code. Packaging metadata and the
/// installer itself are not deployed.
fn collect_virtual_env(virtual_env: &Path) -> Result<Vec<(String, PathBuf)>, UnitError> {
    if !virtual_env.is_dir() {
        return Err(UnitError::InclusionMissing(virtual_env.to_path_buf()));
    }
    let mut out = Vec::new();
    for site_packages in site_package_dirs(virtual_env)? {
        collect_tree(&site_packages, &site_packages, &mut out, &|name, path| {
            if path.is_dir() {
                name != "__pycache__"
                    && !name.ends_with(".dist-info")
                    && !name.ends_with(".egg-info")
                    && name != "pip"
                    && name != "setuptools"
                    && name != "wheel"
            } else {
                !name.ends_with(".pyc")
            }
        })?;
    }
    Ok(out)
}

/// `lib*/python*/site-packages` on posix layouts, `Lib/site-packages` on
/// the windows one.
fn site_package_dirs(virtual_env: &Path) -> Result<Vec<PathBuf>, UnitError> {
    let mut found = Vec::new();
    for lib_name in ["lib", "lib64"] {
        let lib_dir = virtual_env.join(lib_name);
        if !lib_dir.is_dir() {
            continue;
        }
        let mut entries = std::fs::read_dir(&lib_dir)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let candidate = entry.path().join("site-packages");
            if candidate.is_dir() {
                found.push(candidate);
            }
        }
    }
    let windows_layout = virtual_env.join("Lib").join("site-packages");
    if windows_layout.is_dir() {
        found.push(windows_layout);
    }
    if found.is_empty() {
        return Err(UnitError::InclusionMissing(virtual_env.join("site-packages")));
    }
    Ok(found)
}

fn collect_tree(
    dir: &Path,
    base: &Path,
    out: &mut Vec<(String, PathBuf)>,
    keep: &dyn Fn(&str, &Path) -> bool,
) -> Result<(), UnitError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !keep(&name, &path) {
            continue;
        }
        if path.is_dir() {
            collect_tree(&path, base, out, keep)?;
        } else {
            out.push((relative_key(base, &path), path));
        }
    }
    Ok(())
}

fn relative_key(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn same_content(first: &Path, second: &Path) -> Result<bool, UnitError> {
    Ok(std::fs::read(first)? == std::fs::read(second)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("funcship-{}-{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_build_is_deterministic() {
        let first = scratch_dir("det-a");
        write_file(&first, "handler.py", "def handle(event, context):\n    return event\n");
        write_file(&first, "util/helpers.py", "VALUE = 42\n");
        write_file(&first, "util/__init__.py", "");

        // Same tree, files created in a different order.
        let second = scratch_dir("det-b");
        write_file(&second, "util/__init__.py", "");
        write_file(&second, "util/helpers.py", "VALUE = 42\n");
        write_file(&second, "handler.py", "def handle(event, context):\n    return event\n");

        let a = build(&first, &BuildOptions::default()).unwrap();
        let b = build(&second, &BuildOptions::default()).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.files, 3);
    }

    #[test]
    fn test_content_changes_the_fingerprint() {
        let dir = scratch_dir("fp");
        write_file(&dir, "handler.py", "def handle(event, context):\n    return 1\n");
        let before = build(&dir, &BuildOptions::default()).unwrap();
        write_file(&dir, "handler.py", "def handle(event, context):\n    return 2\n");
        let after = build(&dir, &BuildOptions::default()).unwrap();
        assert_ne!(before.fingerprint, after.fingerprint);
    }

    #[test]
    fn test_source_wins_and_last_library_wins() {
        let source = scratch_dir("coll-src");
        write_file(&source, "handler.py", "source");
        write_file(&source, "shared.py", "from source");

        let lib_a = scratch_dir("coll-liba");
        write_file(&lib_a, "shared.py", "from lib a");
        write_file(&lib_a, "only_a.py", "a");

        let lib_b = scratch_dir("coll-libb");
        write_file(&lib_b, "shared.py", "from lib b");

        let options = BuildOptions {
            virtual_env: None,
            libraries: vec![lib_a.clone(), lib_b.clone()],
        };
        let artifact = build(&source, &options).unwrap();
        assert_eq!(artifact.shadowed, vec!["shared.py".to_string()]);

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(artifact.bytes)).unwrap();
        let mut shared = String::new();
        std::io::Read::read_to_string(&mut archive.by_name("shared.py").unwrap(), &mut shared).unwrap();
        // Source beats both libraries.
        assert_eq!(shared, "from source");
        assert!(archive.by_name("only_a.py").is_ok());

        // Without the source collision, the last library wins.
        let bare = scratch_dir("coll-bare");
        write_file(&bare, "handler.py", "source");
        let artifact = build(
            &bare,
            &BuildOptions {
                virtual_env: None,
                libraries: vec![lib_a, lib_b],
            },
        )
        .unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(artifact.bytes)).unwrap();
        let mut shared = String::new();
        std::io::Read::read_to_string(&mut archive.by_name("shared.py").unwrap(), &mut shared).unwrap();
        assert_eq!(shared, "from lib b");
    }

    #[test]
    fn test_virtual_env_is_flattened() {
        let source = scratch_dir("venv-src");
        write_file(&source, "handler.py", "import requests");

        let venv = scratch_dir("venv-env");
        let site = "lib/python3.12/site-packages";
        write_file(&venv, &format!("{}/requests/__init__.py", site), "");
        write_file(&venv, &format!("{}/requests/api.py", site), "def get(): pass");
        write_file(&venv, &format!("{}/requests-2.31.0.dist-info/METADATA", site), "");
        write_file(&venv, &format!("{}/pip/__init__.py", site), "");
        std::fs::write(venv.join("pyvenv.cfg"), "home = /usr/bin").unwrap();

        let artifact = build(
            &source,
            &BuildOptions {
                virtual_env: Some(venv),
                libraries: vec![],
            },
        )
        .unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(artifact.bytes)).unwrap();
        assert!(archive.by_name("requests/api.py").is_ok());
        assert!(archive.by_name("pip/__init__.py").is_err());
        assert!(archive
            .by_name("requests-2.31.0.dist-info/METADATA")
            .is_err());
    }

    #[test]
    fn test_conflicting_site_packages_are_fatal() {
        let source = scratch_dir("venv-conflict-src");
        write_file(&source, "handler.py", "import native");

        // Two site-packages layers shipping the same module with
        // different bytes: no precedence rule orders them.
        let venv = scratch_dir("venv-conflict-env");
        write_file(&venv, "lib/python3.12/site-packages/native/core.py", "SOABI = 'lib'");
        write_file(&venv, "lib64/python3.12/site-packages/native/core.py", "SOABI = 'lib64'");

        let options = BuildOptions {
            virtual_env: Some(venv.clone()),
            libraries: vec![],
        };
        match build(&source, &options) {
            Err(UnitError::Conflict { path, .. }) => assert_eq!(path, "native/core.py"),
            other => panic!("expected a conflict, got {:?}", other.map(|a| a.files)),
        }

        // Identical bytes across layers are fine, and staged once.
        write_file(&venv, "lib64/python3.12/site-packages/native/core.py", "SOABI = 'lib'");
        let artifact = build(&source, &options).unwrap();
        assert_eq!(artifact.files, 2);
    }

    #[test]
    fn test_failure_kinds() {
        let missing = std::env::temp_dir().join(format!("funcship-nowhere-{}", uuid::Uuid::new_v4()));
        assert!(matches!(
            build(&missing, &BuildOptions::default()),
            Err(UnitError::SourceMissing(_))
        ));

        let empty = scratch_dir("empty");
        assert!(matches!(
            build(&empty, &BuildOptions::default()),
            Err(UnitError::SourceEmpty(_))
        ));

        let source = scratch_dir("badlib-src");
        write_file(&source, "handler.py", "x");
        let options = BuildOptions {
            virtual_env: None,
            libraries: vec![missing],
        };
        assert!(matches!(
            build(&source, &options),
            Err(UnitError::InclusionMissing(_))
        ));
    }

    #[test]
    fn test_caches_and_tool_files_are_excluded() {
        let dir = scratch_dir("excl");
        write_file(&dir, "handler.py", "x");
        write_file(&dir, "__pycache__/handler.cpython-312.pyc", "junk");
        write_file(&dir, "handler.pyc", "junk");
        write_file(&dir, "funcship.toml", "region = \"eu-west-1\"");
        write_file(&dir, "old-build.zip", "junk");

        let artifact = build(&dir, &BuildOptions::default()).unwrap();
        assert_eq!(artifact.files, 1);
    }
}
