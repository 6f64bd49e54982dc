// SPDX-License-Identifier: MIT
use aws_sdk_lambda::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_lambda::primitives::Blob;

use crate::error::RegistryError;
use crate::function::{ConfigPatch, CreateFunctionRequest, FunctionConfig, FunctionHandle};
use crate::invocation::{InvocationRequest, InvocationResult, InvocationType};
use crate::registry::FunctionRegistryAPI;

/// AWS Lambda binding of the registry capability. Region and credential
/// profile are resolved once, through the standard provider chain, when
/// the client is constructed.
#[derive(Clone)]
pub struct AwsRegistryClient {
    client: aws_sdk_lambda::Client,
}

impl AwsRegistryClient {
    pub async fn new(region: Option<String>, profile: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let conf = loader.load().await;
        log::debug!("registry client bound to region {:?}", conf.region());
        Self {
            client: aws_sdk_lambda::Client::new(&conf),
        }
    }
}

/// Map a service error code to the registry failure kind. The fallback
/// is `Transport`, which is retryable, so every code the service
/// documents as a permanent rejection must be listed here.
fn classify_error_code(code: Option<&str>, name: &str, message: String) -> RegistryError {
    match code {
        Some("ResourceNotFoundException") => RegistryError::NotFound(name.to_string()),
        Some("TooManyRequestsException") => RegistryError::RateLimited,
        Some("InvalidParameterValueException")
        | Some("ValidationException")
        | Some("RequestEntityTooLargeException")
        | Some("InvalidRequestContentException")
        | Some("ResourceConflictException")
        | Some("CodeStorageExceededException") => RegistryError::ValidationRejected(message),
        Some("AccessDeniedException") | Some("UnauthorizedException") | Some("UnrecognizedClientException") => {
            RegistryError::PermissionDenied(message)
        }
        _ => RegistryError::Transport(message),
    }
}

fn to_registry_error<E>(name: &str, err: SdkError<E>) -> RegistryError
where
    SdkError<E>: ProvideErrorMetadata + std::fmt::Debug,
{
    let message = err
        .message()
        .map(|msg| msg.to_string())
        .unwrap_or_else(|| format!("{:?}", err));
    classify_error_code(err.code(), name, message)
}

#[async_trait::async_trait]
impl FunctionRegistryAPI for AwsRegistryClient {
    async fn function_exists(&mut self, name: &str) -> Result<bool, RegistryError> {
        match self.client.get_function().function_name(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => match to_registry_error(name, err) {
                RegistryError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_function(&mut self, request: CreateFunctionRequest) -> Result<FunctionHandle, RegistryError> {
        let mut req = self
            .client
            .create_function()
            .function_name(&request.function_name)
            .handler(&request.config.handler)
            .role(&request.config.role)
            .runtime(aws_sdk_lambda::types::Runtime::from(request.config.runtime.as_str()))
            .code(
                aws_sdk_lambda::types::FunctionCode::builder()
                    .zip_file(Blob::new(request.archive))
                    .build(),
            );
        if let Some(memory_size) = request.config.memory_size {
            req = req.memory_size(memory_size as i32);
        }
        if let Some(timeout) = request.config.timeout {
            req = req.timeout(timeout as i32);
        }
        if let Some(description) = &request.config.description {
            req = req.description(description);
        }
        let out = req
            .send()
            .await
            .map_err(|err| to_registry_error(&request.function_name, err))?;
        Ok(FunctionHandle {
            function_name: out.function_name().unwrap_or(&request.function_name).to_string(),
            function_arn: out.function_arn().unwrap_or_default().to_string(),
            version: out.version().unwrap_or("$LATEST").to_string(),
        })
    }

    async fn update_function_code(&mut self, name: &str, archive: Vec<u8>) -> Result<FunctionHandle, RegistryError> {
        let out = self
            .client
            .update_function_code()
            .function_name(name)
            .zip_file(Blob::new(archive))
            .send()
            .await
            .map_err(|err| to_registry_error(name, err))?;
        Ok(FunctionHandle {
            function_name: out.function_name().unwrap_or(name).to_string(),
            function_arn: out.function_arn().unwrap_or_default().to_string(),
            version: out.version().unwrap_or("$LATEST").to_string(),
        })
    }

    async fn update_function_configuration(&mut self, name: &str, patch: ConfigPatch) -> Result<(), RegistryError> {
        if patch.is_noop() {
            return Ok(());
        }
        let mut req = self.client.update_function_configuration().function_name(name);
        if let Some(handler) = patch.handler.to_send(String::new()) {
            req = req.handler(handler);
        }
        if let Some(role) = patch.role.to_send(String::new()) {
            req = req.role(role);
        }
        if let Some(runtime) = patch.runtime.to_send(String::new()) {
            req = req.runtime(aws_sdk_lambda::types::Runtime::from(runtime.as_str()));
        }
        // The registry has no notion of an absent memory size or timeout;
        // clearing restores its documented defaults.
        if let Some(memory_size) = patch.memory_size.to_send(128) {
            req = req.memory_size(memory_size as i32);
        }
        if let Some(timeout) = patch.timeout.to_send(3) {
            req = req.timeout(timeout as i32);
        }
        if let Some(description) = patch.description.to_send(String::new()) {
            req = req.description(description);
        }
        req.send().await.map_err(|err| to_registry_error(name, err))?;
        Ok(())
    }

    async fn current_configuration(&mut self, name: &str) -> Result<FunctionConfig, RegistryError> {
        let out = self
            .client
            .get_function_configuration()
            .function_name(name)
            .send()
            .await
            .map_err(|err| to_registry_error(name, err))?;
        Ok(FunctionConfig {
            handler: out.handler().unwrap_or_default().to_string(),
            role: out.role().unwrap_or_default().to_string(),
            runtime: out.runtime().map(|r| r.as_str().to_string()).unwrap_or_default(),
            memory_size: out.memory_size().map(|v| v as u32),
            timeout: out.timeout().map(|v| v as u32),
            description: out.description().map(|d| d.to_string()),
        })
    }

    async fn publish_version(&mut self, name: &str) -> Result<String, RegistryError> {
        let out = self
            .client
            .publish_version()
            .function_name(name)
            .send()
            .await
            .map_err(|err| to_registry_error(name, err))?;
        match out.version() {
            Some(version) => Ok(version.to_string()),
            None => Err(RegistryError::Transport(format!(
                "registry did not return a version identifier for function {}",
                name
            ))),
        }
    }

    async fn set_alias(&mut self, name: &str, alias: &str, version: &str) -> Result<(), RegistryError> {
        let update = self
            .client
            .update_alias()
            .function_name(name)
            .name(alias)
            .function_version(version)
            .send()
            .await;
        match update {
            Ok(_) => Ok(()),
            Err(err) => match to_registry_error(name, err) {
                // First publish with this alias: create it instead.
                RegistryError::NotFound(_) => {
                    self.client
                        .create_alias()
                        .function_name(name)
                        .name(alias)
                        .function_version(version)
                        .send()
                        .await
                        .map_err(|err| to_registry_error(name, err))?;
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    async fn invoke(&mut self, request: InvocationRequest) -> Result<InvocationResult, RegistryError> {
        let invocation_type = match request.invocation_type {
            InvocationType::Synchronous => aws_sdk_lambda::types::InvocationType::RequestResponse,
            InvocationType::Asynchronous => aws_sdk_lambda::types::InvocationType::Event,
            InvocationType::DryRun => aws_sdk_lambda::types::InvocationType::DryRun,
        };
        let mut req = self
            .client
            .invoke()
            .function_name(&request.function_name)
            .invocation_type(invocation_type)
            .payload(Blob::new(request.payload));
        if let Some(qualifier) = &request.qualifier {
            req = req.qualifier(qualifier);
        }
        let out = req
            .send()
            .await
            .map_err(|err| to_registry_error(&request.function_name, err))?;
        Ok(InvocationResult {
            status_code: out.status_code(),
            payload: out.payload().map(|blob| blob.as_ref().to_vec()).unwrap_or_default(),
            function_error: out.function_error().map(|e| e.to_string()),
            executed_version: out.executed_version().map(|v| v.to_string()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn classify(code: &str) -> RegistryError {
        classify_error_code(Some(code), "billing", String::from("rejected"))
    }

    #[test]
    fn test_permanent_rejections_are_not_retried() {
        for code in [
            "InvalidParameterValueException",
            "ValidationException",
            "RequestEntityTooLargeException",
            "InvalidRequestContentException",
            "ResourceConflictException",
            "CodeStorageExceededException",
        ] {
            let err = classify(code);
            assert!(matches!(err, RegistryError::ValidationRejected(_)), "{}: {:?}", code, err);
            assert!(!err.is_retryable(), "{}", code);
        }
        for code in ["AccessDeniedException", "UnauthorizedException", "UnrecognizedClientException"] {
            let err = classify(code);
            assert!(matches!(err, RegistryError::PermissionDenied(_)), "{}: {:?}", code, err);
            assert!(!err.is_retryable(), "{}", code);
        }
        assert!(matches!(classify("ResourceNotFoundException"), RegistryError::NotFound(_)));
    }

    #[test]
    fn test_unknown_codes_stay_retryable() {
        assert!(classify("ServiceException").is_retryable());
        assert!(matches!(classify("TooManyRequestsException"), RegistryError::RateLimited));
        assert!(classify_error_code(None, "billing", String::from("connection reset")).is_retryable());
    }
}
