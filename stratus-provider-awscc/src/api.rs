//! Cloud Control API seam
//!
//! The provider talks to AWS Cloud Control through the [`CloudControlApi`]
//! trait. Responses are converted into plain typed structs at this boundary so
//! the rest of the crate never touches SDK builders or string-typed statuses.

use std::fmt;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use aws_sdk_cloudcontrol::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use stratus_core::retry::{AttemptError, ErrorCode, classify};
use thiserror::Error;

/// Error codes that signal a transient condition worth retrying
pub const RETRYABLE_ERROR_CODES: &[&str] = &[
    "ThrottlingException",
    "RequestLimitExceeded",
    "ConcurrentOperationException",
    "ResourceConflictException",
    "ServiceInternalErrorException",
    "NetworkFailureException",
    "HandlerInternalFailureException",
];

/// Status of an asynchronous Cloud Control operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    InProgress,
    Success,
    Failed,
    CancelInProgress,
    CancelComplete,
    /// A status this client does not know about
    Other(String),
}

impl OperationState {
    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => OperationState::Pending,
            "IN_PROGRESS" => OperationState::InProgress,
            "SUCCESS" => OperationState::Success,
            "FAILED" => OperationState::Failed,
            "CANCEL_IN_PROGRESS" => OperationState::CancelInProgress,
            "CANCEL_COMPLETE" => OperationState::CancelComplete,
            other => OperationState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperationState::Pending => "PENDING",
            OperationState::InProgress => "IN_PROGRESS",
            OperationState::Success => "SUCCESS",
            OperationState::Failed => "FAILED",
            OperationState::CancelInProgress => "CANCEL_IN_PROGRESS",
            OperationState::CancelComplete => "CANCEL_COMPLETE",
            OperationState::Other(s) => s,
        }
    }

    /// Statuses that mean the operation is still running
    pub fn pending() -> Vec<OperationState> {
        vec![
            OperationState::Pending,
            OperationState::InProgress,
            OperationState::CancelInProgress,
        ]
    }

    pub fn target() -> Vec<OperationState> {
        vec![OperationState::Success]
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of a create, update or delete request
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub request_token: String,
    pub status: OperationState,
    /// Primary identifier of the resource, once known
    pub identifier: Option<String>,
    pub status_message: Option<String>,
    pub error_code: Option<String>,
}

impl ProgressEvent {
    pub fn new(request_token: impl Into<String>, status: OperationState) -> Self {
        Self {
            request_token: request_token.into(),
            status,
            identifier: None,
            status_message: None,
            error_code: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }
}

/// Current properties of a resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescription {
    pub identifier: String,
    pub properties: serde_json::Value,
}

/// Error returned by a Cloud Control call
#[derive(Debug, Clone, PartialEq, Error)]
#[error("api[{action}] {}{message}", code_prefix(.code))]
pub struct ApiError {
    pub action: String,
    pub code: Option<String>,
    pub message: String,
    /// Failed before reaching the service (dispatch failure, timeout)
    pub transient: bool,
}

fn code_prefix(code: &Option<String>) -> String {
    match code {
        Some(c) => format!("{}: ", c),
        None => String::new(),
    }
}

impl ApiError {
    pub fn new(action: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            code: Some(code.into()),
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            code: None,
            message: message.into(),
            transient: true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|c| c == "ResourceNotFoundException" || c.contains("NotFound"))
    }
}

impl ErrorCode for ApiError {
    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Classify an API error, treating `extra` codes as retryable for this call site
pub fn retry_error(err: ApiError, extra: &[&str]) -> AttemptError<ApiError> {
    classify(err, RETRYABLE_ERROR_CODES, extra)
}

/// Operations of the Cloud Control API used by the provider
#[async_trait]
pub trait CloudControlApi: Send + Sync {
    async fn create_resource(
        &self,
        type_name: &str,
        desired_state: &str,
    ) -> Result<ProgressEvent, ApiError>;

    async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<ResourceDescription, ApiError>;

    async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_document: &str,
    ) -> Result<ProgressEvent, ApiError>;

    async fn delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<ProgressEvent, ApiError>;

    async fn get_resource_request_status(
        &self,
        request_token: &str,
    ) -> Result<ProgressEvent, ApiError>;
}

/// [`CloudControlApi`] backed by the AWS SDK
pub struct SdkCloudControl {
    client: CloudControlClient,
}

impl SdkCloudControl {
    /// Create a client for the specified region using the default credential chain
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: CloudControlClient::new(&config),
        }
    }

    pub fn from_client(client: CloudControlClient) -> Self {
        Self { client }
    }
}

fn sdk_error<E, R>(action: &str, err: SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    let transient = matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_)
    );
    let service_error = err.as_service_error();
    let code = service_error.and_then(|e| e.code()).map(str::to_string);
    let message = service_error
        .and_then(|e| e.message())
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    ApiError {
        action: action.to_string(),
        code,
        message,
        transient,
    }
}

fn progress_event(
    action: &str,
    event: Option<&aws_sdk_cloudcontrol::types::ProgressEvent>,
) -> Result<ProgressEvent, ApiError> {
    let event = event.ok_or_else(|| ApiError {
        action: action.to_string(),
        code: None,
        message: "No progress event returned".to_string(),
        transient: false,
    })?;

    Ok(ProgressEvent {
        request_token: event.request_token().unwrap_or_default().to_string(),
        status: event
            .operation_status()
            .map(|s| OperationState::parse(s.as_str()))
            .unwrap_or_else(|| OperationState::Other(String::new())),
        identifier: event.identifier().map(str::to_string),
        status_message: event.status_message().map(str::to_string),
        error_code: event.error_code().map(|c| c.as_str().to_string()),
    })
}

#[async_trait]
impl CloudControlApi for SdkCloudControl {
    async fn create_resource(
        &self,
        type_name: &str,
        desired_state: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let output = self
            .client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state)
            .send()
            .await
            .map_err(|e| sdk_error("CreateResource", e))?;
        progress_event("CreateResource", output.progress_event())
    }

    async fn get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<ResourceDescription, ApiError> {
        let output = self
            .client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| sdk_error("GetResource", e))?;

        let desc = output.resource_description();
        let properties = match desc.and_then(|d| d.properties()) {
            Some(props) => serde_json::from_str(props).map_err(|e| ApiError {
                action: "GetResource".to_string(),
                code: None,
                message: format!("Invalid resource properties: {}", e),
                transient: false,
            })?,
            None => serde_json::Value::Null,
        };

        Ok(ResourceDescription {
            identifier: desc
                .and_then(|d| d.identifier())
                .unwrap_or(identifier)
                .to_string(),
            properties,
        })
    }

    async fn update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_document: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let output = self
            .client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .send()
            .await
            .map_err(|e| sdk_error("UpdateResource", e))?;
        progress_event("UpdateResource", output.progress_event())
    }

    async fn delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let output = self
            .client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteResource", e))?;
        progress_event("DeleteResource", output.progress_event())
    }

    async fn get_resource_request_status(
        &self,
        request_token: &str,
    ) -> Result<ProgressEvent, ApiError> {
        let output = self
            .client
            .get_resource_request_status()
            .request_token(request_token)
            .send()
            .await
            .map_err(|e| sdk_error("GetResourceRequestStatus", e))?;
        progress_event("GetResourceRequestStatus", output.progress_event())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_state_round_trips_known_values() {
        for s in [
            "PENDING",
            "IN_PROGRESS",
            "SUCCESS",
            "FAILED",
            "CANCEL_IN_PROGRESS",
            "CANCEL_COMPLETE",
        ] {
            assert_eq!(OperationState::parse(s).as_str(), s);
        }
        assert_eq!(
            OperationState::parse("ROLLING_BACK"),
            OperationState::Other("ROLLING_BACK".to_string())
        );
    }

    #[test]
    fn pending_and_target_sets_are_disjoint() {
        let pending = OperationState::pending();
        for target in OperationState::target() {
            assert!(!pending.contains(&target));
        }
        assert!(!pending.contains(&OperationState::Failed));
        assert!(!pending.contains(&OperationState::CancelComplete));
    }

    #[test]
    fn missing_operation_status_is_not_pending() {
        let sdk_event = aws_sdk_cloudcontrol::types::ProgressEvent::builder()
            .request_token("token-1")
            .build();

        let event = progress_event("GetResourceRequestStatus", Some(&sdk_event)).unwrap();

        assert_eq!(event.request_token, "token-1");
        assert_eq!(event.status, OperationState::Other(String::new()));
        assert!(!OperationState::pending().contains(&event.status));
        assert!(!OperationState::target().contains(&event.status));
    }

    #[test]
    fn missing_progress_event_is_fatal() {
        let err = progress_event("CreateResource", None).unwrap_err();
        assert!(!retry_error(err, &[]).is_retryable());
    }

    #[test]
    fn throttling_and_conflicts_are_retryable() {
        let err = ApiError::new("CreateResource", "ThrottlingException", "Rate exceeded");
        assert!(retry_error(err, &[]).is_retryable());

        let err = ApiError::new(
            "UpdateResource",
            "ConcurrentOperationException",
            "Another operation is in progress",
        );
        assert!(retry_error(err, &[]).is_retryable());

        let err = ApiError::transient("GetResource", "connection reset");
        assert!(retry_error(err, &[]).is_retryable());
    }

    #[test]
    fn validation_errors_are_fatal() {
        let err = ApiError::new("CreateResource", "InvalidRequestException", "Bad CIDR");
        assert!(!retry_error(err.clone(), &[]).is_retryable());
        assert!(retry_error(err, &["InvalidRequestException"]).is_retryable());
    }

    #[test]
    fn not_found_detection() {
        assert!(ApiError::new("GetResource", "ResourceNotFoundException", "gone").is_not_found());
        assert!(!ApiError::new("GetResource", "ThrottlingException", "slow").is_not_found());
        assert!(!ApiError::transient("GetResource", "reset").is_not_found());
    }

    #[test]
    fn error_display_includes_action_and_code() {
        let err = ApiError::new("DeleteResource", "ResourceNotFoundException", "vpc-1 not found");
        assert_eq!(
            err.to_string(),
            "api[DeleteResource] ResourceNotFoundException: vpc-1 not found"
        );
    }
}
