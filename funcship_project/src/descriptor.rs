// SPDX-License-Identifier: MIT
use funcship_api::function::{ConfigPatch, FieldUpdate, FunctionConfig};

use crate::config::FunctionDefaults;
use crate::error::UnitError;

/// Descriptor fields as they arrive from the command line; everything is
/// optional at this boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorOverrides {
    /// Override of the remote function name; the unit's directory name
    /// is used otherwise.
    pub name: Option<String>,
    pub handler: Option<String>,
    pub role: Option<String>,
    pub runtime: Option<String>,
    pub memory_size: Option<u32>,
    pub timeout: Option<u32>,
    pub description: Option<String>,
}

fn pick(overrides: &Option<String>, defaults: Option<&String>) -> Option<String> {
    overrides
        .as_ref()
        .filter(|s| !s.is_empty())
        .or(defaults)
        .cloned()
}

/// Resolution for a function that does not exist remotely yet: explicit
/// flag beats project default, and every missing required field is
/// reported at once.
pub fn resolve_create(
    overrides: &DescriptorOverrides,
    defaults: Option<&FunctionDefaults>,
) -> Result<FunctionConfig, UnitError> {
    let handler = pick(&overrides.handler, defaults.and_then(|d| d.handler.as_ref()));
    let role = pick(&overrides.role, defaults.and_then(|d| d.role.as_ref()));
    let runtime = pick(&overrides.runtime, defaults.and_then(|d| d.runtime.as_ref()));

    let mut missing = Vec::new();
    if handler.is_none() {
        missing.push("handler".to_string());
    }
    if role.is_none() {
        missing.push("role".to_string());
    }
    if runtime.is_none() {
        missing.push("runtime".to_string());
    }
    if !missing.is_empty() {
        return Err(UnitError::Validation(missing));
    }

    Ok(FunctionConfig {
        handler: handler.unwrap(),
        role: role.unwrap(),
        runtime: runtime.unwrap(),
        memory_size: overrides.memory_size.or(defaults.and_then(|d| d.memory_size)),
        timeout: overrides.timeout.or(defaults.and_then(|d| d.timeout)),
        description: pick(&overrides.description, defaults.and_then(|d| d.description.as_ref())),
    })
}

fn patch_string(overrides: &Option<String>, defaults: Option<&String>) -> FieldUpdate<String> {
    match overrides {
        // An explicitly empty flag clears the remote value; this is
        // distinct from not passing the flag at all.
        Some(value) if value.is_empty() => FieldUpdate::Clear,
        Some(value) => FieldUpdate::Set(value.clone()),
        None => match defaults {
            Some(value) => FieldUpdate::Set(value.clone()),
            None => FieldUpdate::Unset,
        },
    }
}

fn patch_number(overrides: Option<u32>, defaults: Option<u32>) -> FieldUpdate<u32> {
    match overrides.or(defaults) {
        Some(value) => FieldUpdate::Set(value),
        None => FieldUpdate::Unset,
    }
}

/// Resolution for an existing remote function: fields resolved neither
/// on the command line nor in the project file stay `Unset`, which
/// leaves the registry's current value untouched.
pub fn resolve_update(overrides: &DescriptorOverrides, defaults: Option<&FunctionDefaults>) -> ConfigPatch {
    ConfigPatch {
        handler: patch_string(&overrides.handler, defaults.and_then(|d| d.handler.as_ref())),
        role: patch_string(&overrides.role, defaults.and_then(|d| d.role.as_ref())),
        runtime: patch_string(&overrides.runtime, defaults.and_then(|d| d.runtime.as_ref())),
        memory_size: patch_number(overrides.memory_size, defaults.and_then(|d| d.memory_size)),
        timeout: patch_number(overrides.timeout, defaults.and_then(|d| d.timeout)),
        description: patch_string(&overrides.description, defaults.and_then(|d| d.description.as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_reports_every_missing_field() {
        let err = resolve_create(&DescriptorOverrides::default(), None).unwrap_err();
        match err {
            UnitError::Validation(missing) => {
                assert_eq!(missing, vec!["handler", "role", "runtime"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_create_flag_beats_project_default() {
        let defaults = FunctionDefaults {
            handler: Some("handler.default".to_string()),
            role: Some("role-from-project".to_string()),
            runtime: Some("python3.11".to_string()),
            memory_size: Some(128),
            timeout: None,
            description: None,
        };
        let overrides = DescriptorOverrides {
            runtime: Some("python3.12".to_string()),
            memory_size: Some(512),
            ..Default::default()
        };
        let config = resolve_create(&overrides, Some(&defaults)).unwrap();
        assert_eq!(config.handler, "handler.default");
        assert_eq!(config.role, "role-from-project");
        assert_eq!(config.runtime, "python3.12");
        assert_eq!(config.memory_size, Some(512));
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_update_tri_state() {
        let overrides = DescriptorOverrides {
            handler: Some("handler.other".to_string()),
            description: Some(String::new()),
            ..Default::default()
        };
        let patch = resolve_update(&overrides, None);
        assert_eq!(patch.handler, FieldUpdate::Set("handler.other".to_string()));
        // Explicitly cleared, not left unchanged.
        assert_eq!(patch.description, FieldUpdate::Clear);
        assert_eq!(patch.role, FieldUpdate::Unset);
        assert_eq!(patch.memory_size, FieldUpdate::Unset);
        assert!(!patch.is_noop());
        assert!(resolve_update(&DescriptorOverrides::default(), None).is_noop());
    }
}
