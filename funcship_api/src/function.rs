// SPDX-License-Identifier: MIT

/// Fully resolved configuration of a function, as required at creation
/// time. Handler, role and runtime are mandatory; the rest fall back to
/// the registry's own defaults when absent.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct FunctionConfig {
    /// Entry point within the deployed archive, e.g. `handler.handle`.
    pub handler: String,
    /// Execution role the registry assumes when running the function.
    pub role: String,
    /// Runtime identifier, e.g. `python3.12`.
    pub runtime: String,
    pub memory_size: Option<u32>,
    pub timeout: Option<u32>,
    pub description: Option<String>,
}

/// Tri-state update for a single configuration field: leave the remote
/// value unchanged, clear it, or replace it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Unset,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, FieldUpdate::Unset)
    }

    /// The value to send to the registry, with `clear_as` standing in for
    /// an explicit clear. `None` means the field is not sent at all.
    pub fn to_send(&self, clear_as: T) -> Option<T>
    where
        T: Clone,
    {
        match self {
            FieldUpdate::Unset => None,
            FieldUpdate::Clear => Some(clear_as),
            FieldUpdate::Set(val) => Some(val.clone()),
        }
    }
}

/// Partial configuration update. Fields left `Unset` are not transmitted,
/// so the remote side keeps its current values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub handler: FieldUpdate<String>,
    pub role: FieldUpdate<String>,
    pub runtime: FieldUpdate<String>,
    pub memory_size: FieldUpdate<u32>,
    pub timeout: FieldUpdate<u32>,
    pub description: FieldUpdate<String>,
}

impl ConfigPatch {
    pub fn is_noop(&self) -> bool {
        self.handler.is_unset()
            && self.role.is_unset()
            && self.runtime.is_unset()
            && self.memory_size.is_unset()
            && self.timeout.is_unset()
            && self.description.is_unset()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFunctionRequest {
    pub function_name: String,
    pub config: FunctionConfig,
    /// Zip archive with the function's code; the registry rejects
    /// functions created without code, hence it is not optional here.
    pub archive: Vec<u8>,
}

/// Identity of a function as known to the registry after a successful
/// create or code update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionHandle {
    pub function_name: String,
    pub function_arn: String,
    /// The unpublished working version, usually `$LATEST`.
    pub version: String,
}
