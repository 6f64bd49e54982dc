// SPDX-License-Identifier: MIT
use crate::error::RegistryError;
use crate::function::{ConfigPatch, CreateFunctionRequest, FunctionConfig, FunctionHandle};
use crate::invocation::{InvocationRequest, InvocationResult};

/// Capability interface of the remote function registry. The region and
/// credential profile are properties of the client, fixed at
/// construction, so they do not appear in the call signatures.
#[async_trait::async_trait]
pub trait FunctionRegistryAPI: FunctionRegistryAPIClone + Sync + Send {
    async fn function_exists(&mut self, name: &str) -> Result<bool, RegistryError>;
    async fn create_function(&mut self, request: CreateFunctionRequest) -> Result<FunctionHandle, RegistryError>;
    async fn update_function_code(&mut self, name: &str, archive: Vec<u8>) -> Result<FunctionHandle, RegistryError>;
    async fn update_function_configuration(&mut self, name: &str, patch: ConfigPatch) -> Result<(), RegistryError>;
    async fn current_configuration(&mut self, name: &str) -> Result<FunctionConfig, RegistryError>;
    /// Snapshot the current code and configuration as an immutable
    /// numbered version, returned as its version identifier.
    async fn publish_version(&mut self, name: &str) -> Result<String, RegistryError>;
    /// Point `alias` at `version`, creating the alias if needed.
    async fn set_alias(&mut self, name: &str, alias: &str, version: &str) -> Result<(), RegistryError>;
    async fn invoke(&mut self, request: InvocationRequest) -> Result<InvocationResult, RegistryError>;
}

// https://stackoverflow.com/a/30353928
pub trait FunctionRegistryAPIClone {
    fn clone_box(&self) -> Box<dyn FunctionRegistryAPI>;
}
impl<T> FunctionRegistryAPIClone for T
where
    T: 'static + FunctionRegistryAPI + Clone,
{
    fn clone_box(&self) -> Box<dyn FunctionRegistryAPI> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn FunctionRegistryAPI> {
    fn clone(&self) -> Box<dyn FunctionRegistryAPI> {
        self.clone_box()
    }
}
