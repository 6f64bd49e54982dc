// SPDX-License-Identifier: MIT
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use funcship_api::function::CreateFunctionRequest;
use funcship_api::invocation::{InvocationRequest, InvocationType};
use funcship_api::registry::FunctionRegistryAPI;

use crate::artifact;
use crate::config::ProjectConfig;
use crate::descriptor::{self, DescriptorOverrides};
use crate::error::UnitError;
use crate::retry::with_retry;
use crate::unit::{self, FunctionUnit};


/// Options shared by every operation on a project, assembled by the
/// caller from command-line flags with project-file defaults filled in
/// by [`Project::new`].
#[derive(Debug, Clone)]
pub struct ProjectSettings {
    pub path: std::path::PathBuf,
    pub qualifier: Option<String>,
    pub virtual_env: Option<std::path::PathBuf>,
    pub libraries: Vec<std::path::PathBuf>,
    pub dry_run: bool,
    pub payload: Option<String>,
    pub invocation_type: InvocationType,
    /// Bound on concurrent units during batch operations.
    pub concurrency: usize,
}

impl ProjectSettings {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self {
            path,
            qualifier: None,
            virtual_env: None,
            libraries: Vec::new(),
            dry_run: false,
            payload: None,
            invocation_type: InvocationType::Synchronous,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployAction {
    Created,
    Updated,
    /// Dry run only: the function does not exist remotely yet.
    WouldCreate,
    /// Dry run only: the function exists and would receive new code.
    WouldUpdate,
}

impl std::fmt::Display for DeployAction {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            DeployAction::Created => write!(fmt, "created"),
            DeployAction::Updated => write!(fmt, "updated"),
            DeployAction::WouldCreate => write!(fmt, "would create"),
            DeployAction::WouldUpdate => write!(fmt, "would update"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub name: String,
    pub action: DeployAction,
    pub fingerprint: String,
    pub archive_size: u64,
    /// The qualifier the deployment targets, also reported on dry runs.
    pub qualifier: Option<String>,
    /// Version the qualifier was attached to, when one was published.
    pub published_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub name: String,
    pub status_code: i32,
    pub payload: Vec<u8>,
    /// Set when the function itself failed; the registry call succeeded.
    pub function_error: Option<String>,
    pub executed_version: Option<String>,
}

impl InvokeOutcome {
    pub fn is_application_error(&self) -> bool {
        self.function_error.is_some()
    }
}

/// Per-unit results of a batch operation, ordered by function name
/// regardless of completion order.
#[derive(Debug)]
pub struct BatchResult<T> {
    pub results: std::collections::BTreeMap<String, Result<T, UnitError>>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            results: std::collections::BTreeMap::new(),
        }
    }
}

impl<T> BatchResult<T> {
    pub fn all_ok(&self) -> bool {
        self.results.values().all(|res| res.is_ok())
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|(_, res)| res.is_err())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn insert(&mut self, name: String, result: Result<T, UnitError>) {
        self.results.insert(name, result);
    }
}

impl<T> FromIterator<(String, Result<T, UnitError>)> for BatchResult<T> {
    fn from_iter<I: IntoIterator<Item = (String, Result<T, UnitError>)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

/// Orchestrator over one project directory: discovers function units,
/// packages them and drives their lifecycle against the registry.
pub struct Project {
    settings: ProjectSettings,
    config: ProjectConfig,
    registry: Box<dyn FunctionRegistryAPI>,
}

impl Project {
    /// Fills unset settings from the project configuration; explicit
    /// settings always win. Paths from the configuration file are
    /// resolved against the project root.
    pub fn new(mut settings: ProjectSettings, config: ProjectConfig, registry: Box<dyn FunctionRegistryAPI>) -> Self {
        if settings.qualifier.is_none() {
            settings.qualifier = config.qualifier.clone();
        }
        if settings.virtual_env.is_none() {
            settings.virtual_env = config.virtual_env.as_ref().map(|p| settings.path.join(p));
        }
        if settings.libraries.is_empty() {
            if let Some(libraries) = &config.libraries {
                settings.libraries = libraries.iter().map(|p| settings.path.join(p)).collect();
            }
        }
        Self {
            settings,
            config,
            registry,
        }
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    fn build_options(&self) -> artifact::BuildOptions {
        artifact::BuildOptions {
            virtual_env: self.settings.virtual_env.clone(),
            libraries: self.settings.libraries.clone(),
        }
    }

    /// Deploy one unit: package, resolve the descriptor, create or
    /// update remotely, then publish the requested qualifier.
    pub async fn deploy(&self, name: &str, overrides: &DescriptorOverrides) -> Result<DeployOutcome, UnitError> {
        let unit = unit::find(&self.settings.path, name)?;
        self.deploy_unit(&unit, overrides).await
    }

    async fn deploy_unit(&self, unit: &FunctionUnit, overrides: &DescriptorOverrides) -> Result<DeployOutcome, UnitError> {
        let artifact = artifact::build(&unit.dir, &self.build_options())?;
        let archive_size = artifact.size();
        let function_name = overrides.name.clone().unwrap_or_else(|| unit.name.clone());
        let defaults = self.config.functions.get(&unit.name);
        log::debug!(
            "deploying {} as {} ({} files, fingerprint {})",
            unit.name,
            function_name,
            artifact.files,
            artifact.fingerprint
        );

        let exists = {
            let name = function_name.clone();
            with_retry("existence check", || {
                let mut registry = self.registry.clone();
                let name = name.clone();
                async move { registry.function_exists(&name).await }
            })
            .await?
        };

        if self.settings.dry_run {
            // Validation must still surface even though nothing is sent.
            if !exists {
                descriptor::resolve_create(overrides, defaults)?;
            }
            return Ok(DeployOutcome {
                name: unit.name.clone(),
                action: if exists { DeployAction::WouldUpdate } else { DeployAction::WouldCreate },
                fingerprint: artifact.fingerprint,
                archive_size,
                qualifier: self.settings.qualifier.clone(),
                published_version: None,
            });
        }

        let action = if !exists {
            let config = descriptor::resolve_create(overrides, defaults)?;
            with_retry("function creation", || {
                let mut registry = self.registry.clone();
                let request = CreateFunctionRequest {
                    function_name: function_name.clone(),
                    config: config.clone(),
                    archive: artifact.bytes.clone(),
                };
                async move { registry.create_function(request).await }
            })
            .await?;
            DeployAction::Created
        } else {
            let patch = descriptor::resolve_update(overrides, defaults);
            with_retry("code update", || {
                let mut registry = self.registry.clone();
                let name = function_name.clone();
                let archive = artifact.bytes.clone();
                async move { registry.update_function_code(&name, archive).await }
            })
            .await?;
            with_retry("configuration update", || {
                let mut registry = self.registry.clone();
                let name = function_name.clone();
                let patch = patch.clone();
                async move { registry.update_function_configuration(&name, patch).await }
            })
            .await?;
            DeployAction::Updated
        };

        let published_version = match &self.settings.qualifier {
            Some(qualifier) => Some(self.publish(&function_name, qualifier).await?),
            None => None,
        };

        Ok(DeployOutcome {
            name: unit.name.clone(),
            action,
            fingerprint: artifact.fingerprint,
            archive_size,
            qualifier: self.settings.qualifier.clone(),
            published_version,
        })
    }

    /// Publish a version and move the qualifier onto it. Either both
    /// steps take effect or the unit fails with a single publish error.
    async fn publish(&self, function_name: &str, qualifier: &str) -> Result<String, UnitError> {
        let version = with_retry("version publication", || {
            let mut registry = self.registry.clone();
            let name = function_name.to_string();
            async move { registry.publish_version(&name).await }
        })
        .await
        .map_err(|source| UnitError::Publish {
            qualifier: qualifier.to_string(),
            source,
        })?;

        with_retry("alias move", || {
            let mut registry = self.registry.clone();
            let name = function_name.to_string();
            let qualifier = qualifier.to_string();
            let version = version.clone();
            async move { registry.set_alias(&name, &qualifier, &version).await }
        })
        .await
        .map_err(|source| UnitError::Publish {
            qualifier: qualifier.to_string(),
            source,
        })?;

        log::info!("qualifier {} now points at version {} of {}", qualifier, version, function_name);
        Ok(version)
    }

    /// Invoke one unit. Without an explicit qualifier the unpublished
    /// working copy is targeted, which is the registry's own default. A
    /// dry run downgrades the call to the registry's non-executing
    /// validation invocation.
    pub async fn invoke(&self, name: &str) -> Result<InvokeOutcome, UnitError> {
        let unit = unit::find(&self.settings.path, name)?;
        self.invoke_unit(&unit).await
    }

    async fn invoke_unit(&self, unit: &FunctionUnit) -> Result<InvokeOutcome, UnitError> {
        let request = InvocationRequest {
            function_name: unit.name.clone(),
            qualifier: self.settings.qualifier.clone(),
            payload: self.settings.payload.clone().map(String::into_bytes).unwrap_or_default(),
            invocation_type: if self.settings.dry_run {
                InvocationType::DryRun
            } else {
                self.settings.invocation_type
            },
        };
        let result = with_retry("invocation", || {
            let mut registry = self.registry.clone();
            let request = request.clone();
            async move { registry.invoke(request).await }
        })
        .await?;
        if let Some(function_error) = &result.function_error {
            log::warn!("{} reported an application error: {}", unit.name, function_error);
        }
        Ok(InvokeOutcome {
            name: unit.name.clone(),
            status_code: result.status_code,
            payload: result.payload,
            function_error: result.function_error,
            executed_version: result.executed_version,
        })
    }

    /// Create a new remote function from command-line inputs only; the
    /// packaged artifact is part of the creation so the function never
    /// exists with placeholder code.
    pub async fn new_function(&self, name: &str, overrides: &DescriptorOverrides) -> Result<DeployOutcome, UnitError> {
        let unit = unit::find(&self.settings.path, name)?;
        let artifact = artifact::build(&unit.dir, &self.build_options())?;
        let archive_size = artifact.size();
        let config = descriptor::resolve_create(overrides, None)?;
        let function_name = overrides.name.clone().unwrap_or_else(|| unit.name.clone());

        if self.settings.dry_run {
            return Ok(DeployOutcome {
                name: unit.name.clone(),
                action: DeployAction::WouldCreate,
                fingerprint: artifact.fingerprint,
                archive_size,
                qualifier: self.settings.qualifier.clone(),
                published_version: None,
            });
        }

        with_retry("function creation", || {
            let mut registry = self.registry.clone();
            let request = CreateFunctionRequest {
                function_name: function_name.clone(),
                config: config.clone(),
                archive: artifact.bytes.clone(),
            };
            async move { registry.create_function(request).await }
        })
        .await?;

        Ok(DeployOutcome {
            name: unit.name.clone(),
            action: DeployAction::Created,
            fingerprint: artifact.fingerprint,
            archive_size,
            qualifier: self.settings.qualifier.clone(),
            published_version: None,
        })
    }

    /// Deploy every discovered unit. Units run independently under the
    /// configured concurrency bound; one unit's failure neither aborts
    /// nor cancels its siblings. Cancelling the token marks units that
    /// did not finish as failed-by-cancellation.
    pub async fn deploy_all(
        &self,
        overrides: &DescriptorOverrides,
        cancel: &CancellationToken,
    ) -> Result<BatchResult<DeployOutcome>, UnitError> {
        let units = unit::discover(&self.settings.path)?;
        Ok(self
            .for_each_unit(units, cancel, |unit| async move { self.deploy_unit(&unit, overrides).await })
            .await)
    }

    /// Deploy the named units, each handled independently and in order.
    /// Once the token is cancelled the remaining names are marked
    /// failed-by-cancellation instead of reaching the registry.
    pub async fn deploy_named(
        &self,
        names: &[String],
        overrides: &DescriptorOverrides,
        cancel: &CancellationToken,
    ) -> BatchResult<DeployOutcome> {
        let mut batch = BatchResult::default();
        for name in names {
            let result = if cancel.is_cancelled() {
                Err(UnitError::Cancelled)
            } else {
                self.deploy(name, overrides).await
            };
            batch.insert(name.clone(), result);
        }
        batch
    }

    /// Invoke the named units, same cancellation semantics as
    /// [`Project::deploy_named`].
    pub async fn invoke_named(&self, names: &[String], cancel: &CancellationToken) -> BatchResult<InvokeOutcome> {
        let mut batch = BatchResult::default();
        for name in names {
            let result = if cancel.is_cancelled() {
                Err(UnitError::Cancelled)
            } else {
                self.invoke(name).await
            };
            batch.insert(name.clone(), result);
        }
        batch
    }

    /// Invoke every discovered unit, same batch semantics as
    /// [`Project::deploy_all`].
    pub async fn invoke_all(&self, cancel: &CancellationToken) -> Result<BatchResult<InvokeOutcome>, UnitError> {
        let units = unit::discover(&self.settings.path)?;
        Ok(self
            .for_each_unit(units, cancel, |unit| async move { self.invoke_unit(&unit).await })
            .await)
    }

    async fn for_each_unit<T, F, Fut>(&self, units: Vec<FunctionUnit>, cancel: &CancellationToken, op: F) -> BatchResult<T>
    where
        F: Fn(FunctionUnit) -> Fut,
        Fut: std::future::Future<Output = Result<T, UnitError>>,
    {
        let op = &op;
        futures::stream::iter(units.into_iter().map(|unit| {
            let cancel = cancel.clone();
            async move {
                let name = unit.name.clone();
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(UnitError::Cancelled),
                    result = op(unit) => result,
                };
                if let Err(err) = &result {
                    log::error!("unit {} failed: {}", name, err);
                }
                (name, result)
            }
        }))
        .buffer_unordered(self.settings.concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect()
    }
}
