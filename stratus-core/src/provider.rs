//! Provider - Trait abstracting resource lifecycle operations
//!
//! A Provider implements create/read/update/delete for the resource types of
//! one vendor. Every operation receives an [`OperationContext`] carrying the
//! logical request id and the provider configuration.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::context::OperationContext;
use crate::mapper::MappingError;
use crate::resource::{Resource, ResourceId, State};
use crate::retry::RetryError;
use crate::schema::ResourceSchema;
use crate::waiter::WaitError;

/// Broad category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Permanent failure reported by the vendor or by the provider itself
    Fatal,
    /// A retry or wait budget ran out while the operation was still converging
    Timeout,
    /// The resource does not exist
    NotFound,
    /// User configuration could not be turned into a request
    Mapping,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub kind: ErrorKind,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Fatal,
            resource_id: None,
            cause: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Timeout)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::NotFound)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Whether the operation may still be converging remotely
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

impl From<MappingError> for ProviderError {
    fn from(err: MappingError) -> Self {
        ProviderError::new(err.to_string())
            .with_kind(ErrorKind::Mapping)
            .with_cause(err)
    }
}

impl<E> From<RetryError<E>> for ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: RetryError<E>) -> Self {
        let message = err.to_string();
        match err {
            RetryError::Fatal(e) => ProviderError::new(message).with_cause(e),
            RetryError::Timeout { last, .. } => ProviderError::timeout(message).with_cause(last),
        }
    }
}

impl<S, E> From<WaitError<S, E>> for ProviderError
where
    S: fmt::Debug + fmt::Display,
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: WaitError<S, E>) -> Self {
        let message = err.to_string();
        match err {
            WaitError::TimedOut { last_error, .. } => {
                let error = ProviderError::timeout(message);
                match last_error {
                    Some(e) => error.with_cause(e),
                    None => error,
                }
            }
            WaitError::Query { source, .. } => ProviderError::new(message).with_cause(source),
            WaitError::NotFound { .. } => ProviderError::not_found(message),
            WaitError::UnexpectedStatus { .. } | WaitError::Closed { .. } => {
                ProviderError::new(message)
            }
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "ec2_vpc")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
    }
}

/// Main Provider trait
///
/// Each infrastructure provider implements this trait.
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "awscc")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource does not exist, including
    /// when it disappeared between a delete and this read.
    fn read<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the vendor ID (e.g., vpc-xxx)
    fn create<'a>(
        &'a self,
        ctx: &'a OperationContext,
        resource: &Resource,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Update a resource in place
    fn update<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Delete a resource
    fn delete<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: &str,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).read(ctx, id, identifier)
    }

    fn create<'a>(
        &'a self,
        ctx: &'a OperationContext,
        resource: &Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).create(ctx, resource)
    }

    fn update<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).update(ctx, id, identifier, from, to)
    }

    fn delete<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: &str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).delete(ctx, id, identifier)
    }
}
