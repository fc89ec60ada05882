//! Translation between resource attributes and Cloud Control payloads
//!
//! Attributes are copied field by field using each schema attribute's
//! `provider_name`. Tags travel as a map on our side and as a list of
//! `{Key, Value}` objects on the AWS side.

use std::collections::HashMap;

use serde_json::json;
use stratus_core::mapper::{MappingError, RequestMapper};
use stratus_core::resource::{Resource, Value};
use stratus_core::schema::ResourceSchema;

use crate::resources::{ResourceConfig, get_config};
use crate::utils::{enum_variant, normalize_availability_zone};

/// [`RequestMapper`] for one Cloud Control resource family
pub struct CloudControlMapper {
    config: &'static ResourceConfig,
    schema: ResourceSchema,
}

impl CloudControlMapper {
    pub fn new(config: &'static ResourceConfig) -> Self {
        Self {
            config,
            schema: (config.schema)(),
        }
    }

    pub fn for_type(resource_type: &str) -> Result<Self, MappingError> {
        get_config(resource_type)
            .map(Self::new)
            .ok_or_else(|| MappingError::UnknownResourceType(resource_type.to_string()))
    }

    pub fn config(&self) -> &'static ResourceConfig {
        self.config
    }

    /// Build JSON Patch `replace` operations moving the resource to `to`
    ///
    /// Computed and absent attributes are left alone.
    pub fn patch_operations(&self, to: &Resource) -> Result<Vec<serde_json::Value>, MappingError> {
        let mut ops = Vec::new();

        for (name, attr) in &self.schema.attributes {
            if name == "tags" || attr.is_computed() {
                continue;
            }
            let (Some(aws_name), Some(value)) = (&attr.provider_name, to.attributes.get(name))
            else {
                continue;
            };
            let aws_value = attribute_to_json(name, value)?;
            ops.push(json!({"op": "replace", "path": format!("/{}", aws_name), "value": aws_value}));
        }

        if self.config.has_tags
            && let Some(tags) = to.attributes.get("tags")
        {
            let tags = build_tags(tags)?;
            ops.push(json!({"op": "replace", "path": "/Tags", "value": tags}));
        }

        Ok(ops)
    }
}

impl RequestMapper for CloudControlMapper {
    type Request = serde_json::Map<String, serde_json::Value>;
    type Response = serde_json::Value;

    fn to_request(&self, resource: &Resource) -> Result<Self::Request, MappingError> {
        let mut desired_state = serde_json::Map::new();

        for (name, attr) in &self.schema.attributes {
            if name == "tags" || attr.is_computed() {
                continue;
            }
            let Some(aws_name) = &attr.provider_name else {
                continue;
            };
            match resource.attributes.get(name) {
                Some(value) => {
                    desired_state.insert(aws_name.clone(), attribute_to_json(name, value)?);
                }
                None if attr.is_required() => {
                    return Err(MappingError::MissingRequired { name: name.clone() });
                }
                None => {}
            }
        }

        if self.config.has_tags
            && let Some(tags) = resource.attributes.get("tags")
        {
            let tags = build_tags(tags)?;
            if !tags.is_empty() {
                desired_state.insert("Tags".to_string(), serde_json::Value::Array(tags));
            }
        }

        for (aws_name, value) in self.config.defaults {
            if !desired_state.contains_key(*aws_name) {
                desired_state.insert(aws_name.to_string(), json!(value));
            }
        }

        Ok(desired_state)
    }

    fn from_response(&self, props: &serde_json::Value) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();

        for (name, attr) in &self.schema.attributes {
            if name == "tags" {
                continue;
            }
            if let Some(aws_name) = &attr.provider_name
                && let Some(value) = props.get(aws_name.as_str())
                && let Some(v) = json_to_value(value)
            {
                attributes.insert(name.clone(), v);
            }
        }

        if self.config.has_tags
            && let Some(tags) = props.get("Tags").and_then(|v| v.as_array())
        {
            let tags = parse_tags(tags);
            if !tags.is_empty() {
                attributes.insert("tags".to_string(), Value::Map(tags));
            }
        }

        // Internet gateways report their VPC through the attachment list
        if self.config.resource_type == "ec2_internet_gateway"
            && let Some(vpc_id) = attached_vpc(props)
        {
            attributes.insert("vpc_id".to_string(), Value::String(vpc_id.to_string()));
        }

        attributes
    }
}

/// First VPC an internet gateway is attached to
pub fn attached_vpc(props: &serde_json::Value) -> Option<&str> {
    props
        .get("Attachments")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|a| a.get("VpcId"))
        .and_then(|v| v.as_str())
}

fn attribute_to_json(name: &str, value: &Value) -> Result<serde_json::Value, MappingError> {
    match (name, value) {
        ("availability_zone", Value::String(s)) => Ok(json!(normalize_availability_zone(s))),
        ("instance_tenancy" | "connectivity_type" | "vpc_endpoint_type" | "domain", Value::String(s)) => {
            Ok(json!(enum_variant(s)))
        }
        _ => value_to_json(value).ok_or_else(|| MappingError::Unconvertible {
            name: name.to_string(),
            reason: "maps are only supported for tags".to_string(),
        }),
    }
}

/// Convert an attribute value to JSON
fn value_to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::String(s) => Some(json!(s)),
        Value::Bool(b) => Some(json!(b)),
        Value::Int(i) => Some(json!(i)),
        Value::List(items) => items
            .iter()
            .map(value_to_json)
            .collect::<Option<Vec<_>>>()
            .map(serde_json::Value::Array),
        Value::Map(_) => None,
    }
}

/// Convert a JSON value to an attribute value
fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        // Fractional numbers have no attribute representation
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
        serde_json::Value::Array(arr) => {
            Some(Value::List(arr.iter().filter_map(json_to_value).collect()))
        }
        _ => None,
    }
}

/// Build the CloudFormation tag list, sorted by key
fn build_tags(tags: &Value) -> Result<Vec<serde_json::Value>, MappingError> {
    let Value::Map(tags) = tags else {
        return Err(MappingError::Unconvertible {
            name: "tags".to_string(),
            reason: "expected a map".to_string(),
        });
    };

    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort();

    keys.into_iter()
        .map(|key| match &tags[key] {
            Value::String(v) => Ok(json!({"Key": key, "Value": v})),
            _ => Err(MappingError::Unconvertible {
                name: format!("tags.{}", key),
                reason: "tag values must be strings".to_string(),
            }),
        })
        .collect()
}

/// Parse the CloudFormation tag list into a map
fn parse_tags(tags: &[serde_json::Value]) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    for tag in tags {
        if let (Some(key), Some(value)) = (
            tag.get("Key").and_then(|v| v.as_str()),
            tag.get("Value").and_then(|v| v.as_str()),
        ) {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    map
}
