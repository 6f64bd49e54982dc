// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use crate::error::UnitError;

/// One deployable function: a subdirectory of the project root holding
/// its handler sources. Units are read, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionUnit {
    pub name: String,
    pub dir: PathBuf,
}

fn has_handler_source(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().any(|entry| {
            entry.path().is_file() && entry.file_name().to_string_lossy().ends_with(".py")
        }),
        Err(_) => false,
    }
}

/// Every immediate subdirectory with a top-level handler source file is
/// a unit. Results are sorted by name so nothing downstream depends on
/// filesystem enumeration order.
pub fn discover(project_root: &Path) -> Result<Vec<FunctionUnit>, UnitError> {
    if !project_root.is_dir() {
        return Err(UnitError::SourceMissing(project_root.to_path_buf()));
    }
    let mut units = Vec::new();
    for entry in std::fs::read_dir(project_root)? {
        let entry = entry?;
        let dir = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if dir.is_dir() && !name.starts_with('.') && has_handler_source(&dir) {
            units.push(FunctionUnit { name, dir });
        }
    }
    units.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(units)
}

/// Exact match on the unit's directory name; a miss is an unknown
/// function, not a build or registry failure.
pub fn find(project_root: &Path, name: &str) -> Result<FunctionUnit, UnitError> {
    discover(project_root)?
        .into_iter()
        .find(|unit| unit.name == name)
        .ok_or_else(|| UnitError::UnknownFunction(name.to_string()))
}
