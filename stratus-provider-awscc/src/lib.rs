//! Stratus AWS Cloud Control Provider
//!
//! AWS Cloud Control API Provider implementation.
//!
//! ## Module Structure
//!
//! - `api` - Cloud Control API seam and its AWS SDK implementation
//! - `resources` - Resource type definitions and configurations
//! - `mapper` - Attribute to Cloud Control payload translation
//! - `provider` - AwsccProvider implementation
//! - `utils` - Helper functions for value normalization

pub mod api;
pub mod mapper;
pub mod provider;
pub mod resources;
pub mod utils;

// Re-export main types
pub use api::{CloudControlApi, OperationState, ProgressEvent, SdkCloudControl};
pub use provider::AwsccProvider;
pub use utils::{enum_variant, normalize_availability_zone, normalize_region};

use stratus_core::context::OperationContext;
use stratus_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use stratus_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for AwsccProvider {
    fn name(&self) -> &'static str {
        "awscc"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(ctx, &id, identifier.as_deref()).await })
    }

    fn create<'a>(
        &'a self,
        ctx: &'a OperationContext,
        resource: &Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(ctx, &resource).await })
    }

    fn update<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move { self.update_resource(ctx, &id, &identifier, &to).await })
    }

    fn delete<'a>(
        &'a self,
        ctx: &'a OperationContext,
        id: &ResourceId,
        identifier: &str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(ctx, &id, &identifier).await })
    }
}
