//! Mapper - Translation between user configuration and vendor payloads
//!
//! Mappers are pure: building a request never talks to the vendor, and
//! flattening a response never fails for a well-formed payload.

use std::collections::HashMap;

use thiserror::Error;

use crate::resource::{Resource, Value};

/// Errors raised while building a vendor request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' cannot be converted: {reason}")]
    Unconvertible { name: String, reason: String },

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),
}

/// Per resource family translation between configuration and vendor payloads
pub trait RequestMapper {
    /// Vendor request payload
    type Request;
    /// Vendor response payload
    type Response;

    /// Build the vendor request for creating `resource`
    fn to_request(&self, resource: &Resource) -> Result<Self::Request, MappingError>;

    /// Flatten a vendor response into configuration-shaped attributes
    fn from_response(&self, response: &Self::Response) -> HashMap<String, Value>;
}
