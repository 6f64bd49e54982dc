// SPDX-License-Identifier: MIT

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum InvocationType {
    /// Wait for the function to finish and return its response payload.
    Synchronous,
    /// Queue the event and return immediately.
    Asynchronous,
    /// Validate permissions and inputs without running the function.
    DryRun,
}

impl InvocationType {
    pub fn from_string(invocation_type: &str) -> anyhow::Result<Self> {
        match invocation_type {
            "sync" | "RequestResponse" => Ok(Self::Synchronous),
            "async" | "Event" => Ok(Self::Asynchronous),
            "dry" | "DryRun" => Ok(Self::DryRun),
            _ => Err(anyhow::anyhow!("invalid invocation type: {}", invocation_type)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub function_name: String,
    /// Alias or version number selecting the published version to run.
    /// `None` targets the unpublished working copy.
    pub qualifier: Option<String>,
    /// May be empty.
    pub payload: Vec<u8>,
    pub invocation_type: InvocationType,
}

/// Outcome of an invocation that reached the registry. A set
/// `function_error` means the function itself failed; that is not a
/// registry call failure and is reported separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub status_code: i32,
    pub payload: Vec<u8>,
    pub function_error: Option<String>,
    pub executed_version: Option<String>,
}
