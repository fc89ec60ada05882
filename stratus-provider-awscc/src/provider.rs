//! AWS Cloud Control Provider implementation
//!
//! This module contains the main provider implementation that communicates
//! with AWS Cloud Control API to manage resources. Every API call goes
//! through the retry primitive, and every asynchronous operation is awaited
//! with a [`StateChangeConf`] over [`OperationState`].

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde_json::json;
use stratus_core::context::OperationContext;
use stratus_core::mapper::RequestMapper;
use stratus_core::provider::{ProviderError, ProviderResult};
use stratus_core::ratelimit::RateLimiter;
use stratus_core::resource::{Resource, ResourceId, State};
use stratus_core::retry::{AttemptError, retry};
use stratus_core::waiter::{Snapshot, StateChangeConf, WaitSettings};

use crate::api::{
    ApiError, CloudControlApi, OperationState, ProgressEvent, ResourceDescription,
    SdkCloudControl, retry_error,
};
use crate::mapper::{CloudControlMapper, attached_vpc};
use crate::resources::{ResourceConfig, get_config};

/// Attach the resource id to any error convertible into a [`ProviderError`]
fn for_resource<E: Into<ProviderError>>(id: &ResourceId) -> impl FnOnce(E) -> ProviderError + '_ {
    move |e| e.into().for_resource(id.clone())
}

fn mapper_for(id: &ResourceId) -> ProviderResult<CloudControlMapper> {
    CloudControlMapper::for_type(&id.resource_type).map_err(for_resource(id))
}

/// AWS Cloud Control Provider
pub struct AwsccProvider {
    api: Arc<dyn CloudControlApi>,
    limiter: Arc<RateLimiter>,
}

impl AwsccProvider {
    /// Create a new AwsccProvider for the specified region
    pub async fn new(region: &str) -> Self {
        Self::with_api(Arc::new(SdkCloudControl::new(region).await))
    }

    pub fn with_api(api: Arc<dyn CloudControlApi>) -> Self {
        Self {
            api,
            limiter: Arc::new(RateLimiter::default()),
        }
    }

    /// Limit each Cloud Control action to `per_second` calls
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = Arc::new(RateLimiter::new(per_second));
        self
    }

    // =========================================================================
    // Cloud Control API Methods
    // =========================================================================

    /// Get a resource by identifier; `None` when it does not exist
    pub async fn cc_get_resource(
        &self,
        ctx: &OperationContext,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<Option<ResourceDescription>> {
        let api = &*self.api;
        let limiter = &*self.limiter;
        let description = retry(
            &ctx.log_id,
            &ctx.config.read_policy(),
            "GetResource",
            move || async move {
                limiter.check("GetResource").await;
                match api.get_resource(type_name, identifier).await {
                    Ok(desc) => Ok(Some(desc)),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(retry_error(e, &[])),
                }
            },
        )
        .await?;
        Ok(description)
    }

    /// Start creating a resource
    pub async fn cc_create_resource(
        &self,
        ctx: &OperationContext,
        type_name: &str,
        desired_state: &str,
    ) -> ProviderResult<ProgressEvent> {
        let api = &*self.api;
        let limiter = &*self.limiter;
        let event = retry(
            &ctx.log_id,
            &ctx.config.write_policy(),
            "CreateResource",
            move || async move {
                limiter.check("CreateResource").await;
                api.create_resource(type_name, desired_state)
                    .await
                    .map_err(|e| retry_error(e, &[]))
            },
        )
        .await?;
        Ok(event)
    }

    /// Start updating a resource with a JSON Patch document
    pub async fn cc_update_resource(
        &self,
        ctx: &OperationContext,
        type_name: &str,
        identifier: &str,
        patch_ops: &[serde_json::Value],
    ) -> ProviderResult<ProgressEvent> {
        let patch_document = serde_json::to_string(patch_ops)
            .map_err(|e| ProviderError::new(format!("Failed to build patch: {}", e)))?;
        let patch_document = patch_document.as_str();

        let api = &*self.api;
        let limiter = &*self.limiter;
        let event = retry(
            &ctx.log_id,
            &ctx.config.write_policy(),
            "UpdateResource",
            move || async move {
                limiter.check("UpdateResource").await;
                api.update_resource(type_name, identifier, patch_document)
                    .await
                    .map_err(|e| retry_error(e, &[]))
            },
        )
        .await?;
        Ok(event)
    }

    /// Start deleting a resource
    ///
    /// A resource that is already gone is reported as a fatal error.
    pub async fn cc_delete_resource(
        &self,
        ctx: &OperationContext,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<ProgressEvent> {
        let api = &*self.api;
        let limiter = &*self.limiter;
        let event = retry(
            &ctx.log_id,
            &ctx.config.write_policy(),
            "DeleteResource",
            move || async move {
                limiter.check("DeleteResource").await;
                api.delete_resource(type_name, identifier)
                    .await
                    .map_err(|e| retry_error(e, &[]))
            },
        )
        .await?;
        Ok(event)
    }

    /// Wait for a Cloud Control operation to reach SUCCESS
    ///
    /// FAILED and CANCEL_COMPLETE end the wait with the vendor's status
    /// message. Running out of time yields a timeout error, not a failure.
    pub async fn wait_for_operation(
        &self,
        ctx: &OperationContext,
        label: &str,
        settings: WaitSettings,
        request_token: &str,
    ) -> ProviderResult<ProgressEvent> {
        let conf = StateChangeConf::new(label, OperationState::pending(), OperationState::target())
            .with_settings(settings)
            .with_min_timeout(Duration::from_millis(ctx.config.min_backoff_ms))
            .with_query_backoff(
                Duration::from_millis(ctx.config.min_backoff_ms),
                Duration::from_millis(ctx.config.max_backoff_ms),
            );

        let api = &*self.api;
        let limiter = &*self.limiter;
        let snapshot = conf
            .wait_for_state(&ctx.log_id, move || async move {
                limiter.check("GetResourceRequestStatus").await;
                let event = api
                    .get_resource_request_status(request_token)
                    .await
                    .map_err(|e| retry_error(e, &[]))?;
                let status = event.status.clone();
                let message = event.status_message.clone();
                let snapshot = Snapshot::new(event, status);
                Ok::<_, AttemptError<ApiError>>(Some(match message {
                    Some(m) => snapshot.with_message(m),
                    None => snapshot,
                }))
            })
            .await?;

        Ok(snapshot.value)
    }

    /// Wait for an operation started elsewhere, using the family's timing
    pub async fn wait_for_request(
        &self,
        ctx: &OperationContext,
        resource_type: &str,
        request_token: &str,
    ) -> ProviderResult<ProgressEvent> {
        let settings = match get_config(resource_type) {
            Some(config) => self.wait_settings(ctx, config),
            None => WaitSettings::default(),
        };
        let label = format!("{} request {}", resource_type, request_token);
        let _elapsed = ctx.elapsed(format!("wait {}", label));
        self.wait_for_operation(ctx, &label, settings, request_token)
            .await
    }

    fn wait_settings(&self, ctx: &OperationContext, config: &ResourceConfig) -> WaitSettings {
        config
            .wait
            .with_override(ctx.config.family(config.resource_type))
    }

    /// Wait for `event` unless it already finished successfully
    async fn settle(
        &self,
        ctx: &OperationContext,
        id: &ResourceId,
        config: &ResourceConfig,
        event: ProgressEvent,
    ) -> ProviderResult<ProgressEvent> {
        if event.status == OperationState::Success {
            return Ok(event);
        }
        self.wait_for_operation(
            ctx,
            &id.to_string(),
            self.wait_settings(ctx, config),
            &event.request_token,
        )
        .await
        .map_err(for_resource(id))
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its vendor identifier
    pub async fn read_resource(
        &self,
        ctx: &OperationContext,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let _elapsed = ctx.elapsed(format!("read {}", id));
        let mapper = mapper_for(id)?;

        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        let description = self
            .cc_get_resource(ctx, mapper.config().aws_type_name, identifier)
            .await
            .map_err(for_resource(id))?;

        let Some(description) = description else {
            info!("[{}] {} ({}) not found", ctx.log_id, id, identifier);
            return Ok(State::not_found(id.clone()));
        };

        let attributes = mapper.from_response(&description.properties);
        Ok(State::existing(id.clone(), attributes).with_identifier(description.identifier))
    }

    /// Create a resource and read it back once the operation succeeds
    pub async fn create_resource(
        &self,
        ctx: &OperationContext,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let _elapsed = ctx.elapsed(format!("create {}", id));
        let mapper = mapper_for(id)?;
        let config = mapper.config();

        let desired_state = mapper.to_request(resource).map_err(for_resource(id))?;
        let desired_state = serde_json::Value::Object(desired_state).to_string();

        let event = self
            .cc_create_resource(ctx, config.aws_type_name, &desired_state)
            .await
            .map_err(for_resource(id))?;
        let initial_identifier = event.identifier.clone();
        let done = self.settle(ctx, id, config, event).await?;

        let identifier = done.identifier.or(initial_identifier).ok_or_else(|| {
            ProviderError::new("Operation succeeded without returning an identifier")
                .for_resource(id.clone())
        })?;
        info!("[{}] created {} ({})", ctx.log_id, id, identifier);

        self.read_resource(ctx, id, Some(&identifier)).await
    }

    /// Update a resource in place
    pub async fn update_resource(
        &self,
        ctx: &OperationContext,
        id: &ResourceId,
        identifier: &str,
        to: &Resource,
    ) -> ProviderResult<State> {
        let _elapsed = ctx.elapsed(format!("update {}", id));
        let mapper = mapper_for(id)?;
        let config = mapper.config();

        if !config.updatable {
            return Err(ProviderError::new(format!(
                "Update not supported for {}, delete and recreate",
                id.resource_type
            ))
            .for_resource(id.clone()));
        }

        let patch_ops = mapper.patch_operations(to).map_err(for_resource(id))?;
        if !patch_ops.is_empty() {
            let event = self
                .cc_update_resource(ctx, config.aws_type_name, identifier, &patch_ops)
                .await
                .map_err(for_resource(id))?;
            self.settle(ctx, id, config, event).await?;
        }

        self.read_resource(ctx, id, Some(identifier)).await
    }

    /// Delete a resource and wait until it is gone
    pub async fn delete_resource(
        &self,
        ctx: &OperationContext,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let _elapsed = ctx.elapsed(format!("delete {}", id));
        let config = mapper_for(id)?.config();

        self.pre_delete_operations(ctx, id, config, identifier)
            .await?;

        let event = self
            .cc_delete_resource(ctx, config.aws_type_name, identifier)
            .await
            .map_err(for_resource(id))?;
        self.settle(ctx, id, config, event).await?;
        info!("[{}] deleted {} ({})", ctx.log_id, id, identifier);
        Ok(())
    }

    /// Handle pre-delete operations (e.g., detach IGW from VPC)
    async fn pre_delete_operations(
        &self,
        ctx: &OperationContext,
        id: &ResourceId,
        config: &ResourceConfig,
        identifier: &str,
    ) -> ProviderResult<()> {
        if id.resource_type != "ec2_internet_gateway" {
            return Ok(());
        }

        let Some(description) = self
            .cc_get_resource(ctx, config.aws_type_name, identifier)
            .await
            .map_err(for_resource(id))?
        else {
            return Ok(());
        };
        let Some(vpc_id) = attached_vpc(&description.properties) else {
            return Ok(());
        };

        info!("[{}] detaching {} from {}", ctx.log_id, id, vpc_id);
        let patch_ops = [json!({"op": "remove", "path": "/Attachments"})];
        let detached = match self
            .cc_update_resource(ctx, config.aws_type_name, identifier, &patch_ops)
            .await
        {
            Ok(event) => self.settle(ctx, id, config, event).await.map(|_| ()),
            Err(e) => Err(e),
        };
        // The delete below reports the real failure if the gateway is still attached
        if let Err(e) = detached {
            warn!("[{}] failed to detach {}: {}", ctx.log_id, id, e);
        }
        Ok(())
    }
}
