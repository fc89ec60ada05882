//! Resource type configurations for AWS Cloud Control API
//!
//! This module defines:
//! - The schema of every supported resource type
//! - Mapping between resource types and CloudFormation type names
//! - How long to wait for each family's asynchronous operations

use std::time::Duration;

use stratus_core::provider::ResourceType;
use stratus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use stratus_core::waiter::WaitSettings;

/// Resource type configuration
pub struct ResourceConfig {
    /// Resource type name (e.g., "ec2_vpc")
    pub resource_type: &'static str,
    /// AWS CloudFormation type name (e.g., "AWS::EC2::VPC")
    pub aws_type_name: &'static str,
    /// Whether this resource type uses tags
    pub has_tags: bool,
    /// Whether changes can be applied in place
    pub updatable: bool,
    /// Built-in wait timing, overridable per family in the provider config
    pub wait: WaitSettings,
    /// Properties set on create when absent (AWS name, value)
    pub defaults: &'static [(&'static str, &'static str)],
    pub schema: fn() -> ResourceSchema,
}

const fn wait(timeout_mins: u64, delay_secs: u64, interval_secs: u64) -> WaitSettings {
    WaitSettings::new(
        Duration::from_secs(timeout_mins * 60),
        Duration::from_secs(delay_secs),
        Duration::from_secs(interval_secs),
    )
}

// =============================================================================
// Schemas
// =============================================================================

fn tags(description: &str) -> AttributeSchema {
    AttributeSchema::new("tags", types::tags())
        .with_description(description)
        .with_provider_name("Tags")
}

fn computed_id(name: &str, provider_name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
        .computed()
        .with_description("Identifier assigned by AWS (read-only)")
        .with_provider_name(provider_name)
}

fn vpc_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_vpc")
        .with_description("Specifies a virtual private cloud (VPC).")
        .attribute(computed_id("vpc_id", "VpcId"))
        .attribute(
            AttributeSchema::new("cidr_block", types::cidr())
                .required()
                .with_description("The IPv4 network range for the VPC, in CIDR notation.")
                .with_provider_name("CidrBlock"),
        )
        .attribute(
            AttributeSchema::new("enable_dns_hostnames", AttributeType::Bool)
                .with_description("Indicates whether the instances launched in the VPC get DNS hostnames.")
                .with_provider_name("EnableDnsHostnames"),
        )
        .attribute(
            AttributeSchema::new("enable_dns_support", AttributeType::Bool)
                .with_description("Indicates whether the DNS resolution is supported for the VPC.")
                .with_provider_name("EnableDnsSupport"),
        )
        .attribute(
            AttributeSchema::new(
                "instance_tenancy",
                AttributeType::Enum(vec![
                    "default".to_string(),
                    "dedicated".to_string(),
                    "host".to_string(),
                ]),
            )
            .with_description("The allowed tenancy of instances launched into the VPC.")
            .with_provider_name("InstanceTenancy"),
        )
        .attribute(computed_id("default_security_group", "DefaultSecurityGroup"))
        .attribute(tags("The tags for the VPC."))
}

fn subnet_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_subnet")
        .with_description("Specifies a subnet for the specified VPC.")
        .attribute(computed_id("subnet_id", "SubnetId"))
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .with_description("The ID of the VPC the subnet is in.")
                .with_provider_name("VpcId"),
        )
        .attribute(
            AttributeSchema::new("cidr_block", types::cidr())
                .required()
                .with_description("The IPv4 CIDR block assigned to the subnet.")
                .with_provider_name("CidrBlock"),
        )
        .attribute(
            AttributeSchema::new("availability_zone", AttributeType::String)
                .with_description("The Availability Zone of the subnet.")
                .with_provider_name("AvailabilityZone"),
        )
        .attribute(
            AttributeSchema::new("map_public_ip_on_launch", AttributeType::Bool)
                .with_description("Indicates whether instances launched in this subnet receive a public IPv4 address.")
                .with_provider_name("MapPublicIpOnLaunch"),
        )
        .attribute(tags("Any tags assigned to the subnet."))
}

fn internet_gateway_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_internet_gateway")
        .with_description("Allocates an internet gateway for use with a VPC.")
        .attribute(computed_id("internet_gateway_id", "InternetGatewayId"))
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .computed()
                .with_description("The VPC the gateway is attached to (read-only)"),
        )
        .attribute(tags("Any tags to assign to the internet gateway."))
}

fn route_table_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_route_table")
        .with_description("Specifies a route table for the specified VPC.")
        .attribute(computed_id("route_table_id", "RouteTableId"))
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .with_description("The ID of the VPC.")
                .with_provider_name("VpcId"),
        )
        .attribute(tags("Any tags assigned to the route table."))
}

fn route_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_route")
        .with_description("Specifies a route in a route table.")
        .attribute(
            AttributeSchema::new("route_table_id", AttributeType::String)
                .required()
                .with_description("The ID of the route table for the route.")
                .with_provider_name("RouteTableId"),
        )
        .attribute(
            AttributeSchema::new("destination_cidr_block", types::cidr())
                .with_description("The IPv4 CIDR address block used for the destination match.")
                .with_provider_name("DestinationCidrBlock"),
        )
        .attribute(
            AttributeSchema::new("gateway_id", AttributeType::String)
                .with_description("The ID of an internet gateway or virtual private gateway.")
                .with_provider_name("GatewayId"),
        )
        .attribute(
            AttributeSchema::new("nat_gateway_id", AttributeType::String)
                .with_description("The ID of a NAT gateway.")
                .with_provider_name("NatGatewayId"),
        )
}

fn security_group_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_security_group")
        .with_description("Specifies a security group.")
        .attribute(computed_id("group_id", "GroupId"))
        .attribute(
            AttributeSchema::new("group_description", AttributeType::String)
                .required()
                .with_description("A description for the security group.")
                .with_provider_name("GroupDescription"),
        )
        .attribute(
            AttributeSchema::new("group_name", AttributeType::String)
                .with_description("The name of the security group.")
                .with_provider_name("GroupName"),
        )
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .with_description("The ID of the VPC for the security group.")
                .with_provider_name("VpcId"),
        )
        .attribute(tags("Any tags assigned to the security group."))
}

fn eip_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_eip")
        .with_description("Specifies an Elastic IP (EIP) address.")
        .attribute(computed_id("allocation_id", "AllocationId"))
        .attribute(computed_id("public_ip", "PublicIp"))
        .attribute(
            AttributeSchema::new("domain", AttributeType::Enum(vec!["vpc".to_string()]))
                .with_description("The network (vpc).")
                .with_provider_name("Domain"),
        )
        .attribute(
            AttributeSchema::new("network_border_group", AttributeType::String)
                .with_description("A unique set of zones from which AWS advertises IP addresses.")
                .with_provider_name("NetworkBorderGroup"),
        )
        .attribute(tags("Any tags assigned to the Elastic IP address."))
}

fn nat_gateway_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_nat_gateway")
        .with_description("Specifies a network address translation (NAT) gateway in the specified subnet.")
        .attribute(computed_id("nat_gateway_id", "NatGatewayId"))
        .attribute(
            AttributeSchema::new("subnet_id", AttributeType::String)
                .required()
                .with_description("The ID of the subnet in which the NAT gateway is located.")
                .with_provider_name("SubnetId"),
        )
        .attribute(
            AttributeSchema::new("allocation_id", AttributeType::String)
                .with_description("[Public NAT gateway only] The allocation ID of the Elastic IP address.")
                .with_provider_name("AllocationId"),
        )
        .attribute(
            AttributeSchema::new(
                "connectivity_type",
                AttributeType::Enum(vec!["public".to_string(), "private".to_string()]),
            )
            .with_description("Indicates whether the NAT gateway supports public or private connectivity.")
            .with_provider_name("ConnectivityType"),
        )
        .attribute(tags("The tags for the NAT gateway."))
}

fn vpc_endpoint_schema() -> ResourceSchema {
    ResourceSchema::new("ec2_vpc_endpoint")
        .with_description("Specifies a VPC endpoint.")
        .attribute(computed_id("id", "Id"))
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .with_description("The ID of the VPC.")
                .with_provider_name("VpcId"),
        )
        .attribute(
            AttributeSchema::new("service_name", AttributeType::String)
                .required()
                .with_description("The name of the endpoint service.")
                .with_provider_name("ServiceName"),
        )
        .attribute(
            AttributeSchema::new(
                "vpc_endpoint_type",
                AttributeType::Enum(vec!["Interface".to_string(), "Gateway".to_string()]),
            )
            .with_description("The type of endpoint.")
            .with_provider_name("VpcEndpointType"),
        )
        .attribute(
            AttributeSchema::new(
                "route_table_ids",
                AttributeType::List(Box::new(AttributeType::String)),
            )
            .with_description("The IDs of the route tables. Routing is supported only for gateway endpoints.")
            .with_provider_name("RouteTableIds"),
        )
}

// =============================================================================
// Resource Configurations
// =============================================================================

pub static CONFIGS: &[ResourceConfig] = &[
    ResourceConfig {
        resource_type: "ec2_vpc",
        aws_type_name: "AWS::EC2::VPC",
        has_tags: true,
        updatable: true,
        wait: wait(10, 2, 5),
        defaults: &[],
        schema: vpc_schema,
    },
    ResourceConfig {
        resource_type: "ec2_subnet",
        aws_type_name: "AWS::EC2::Subnet",
        has_tags: true,
        updatable: true,
        wait: wait(10, 2, 5),
        defaults: &[],
        schema: subnet_schema,
    },
    ResourceConfig {
        resource_type: "ec2_internet_gateway",
        aws_type_name: "AWS::EC2::InternetGateway",
        has_tags: true,
        updatable: true,
        wait: wait(10, 2, 5),
        defaults: &[],
        schema: internet_gateway_schema,
    },
    ResourceConfig {
        resource_type: "ec2_route_table",
        aws_type_name: "AWS::EC2::RouteTable",
        has_tags: true,
        updatable: true,
        wait: wait(10, 2, 5),
        defaults: &[],
        schema: route_table_schema,
    },
    ResourceConfig {
        resource_type: "ec2_route",
        aws_type_name: "AWS::EC2::Route",
        has_tags: false,
        updatable: false,
        wait: wait(5, 1, 3),
        defaults: &[],
        schema: route_schema,
    },
    ResourceConfig {
        resource_type: "ec2_security_group",
        aws_type_name: "AWS::EC2::SecurityGroup",
        has_tags: true,
        updatable: true,
        wait: wait(10, 2, 5),
        defaults: &[],
        schema: security_group_schema,
    },
    ResourceConfig {
        resource_type: "ec2_eip",
        aws_type_name: "AWS::EC2::EIP",
        has_tags: true,
        updatable: true,
        wait: wait(10, 2, 5),
        defaults: &[("Domain", "vpc")],
        schema: eip_schema,
    },
    ResourceConfig {
        resource_type: "ec2_nat_gateway",
        aws_type_name: "AWS::EC2::NatGateway",
        has_tags: true,
        updatable: false,
        wait: wait(30, 15, 15),
        defaults: &[],
        schema: nat_gateway_schema,
    },
    ResourceConfig {
        resource_type: "ec2_vpc_endpoint",
        aws_type_name: "AWS::EC2::VPCEndpoint",
        has_tags: false,
        updatable: true,
        wait: wait(20, 5, 10),
        defaults: &[],
        schema: vpc_endpoint_schema,
    },
];

/// Look up the configuration of a resource type
pub fn get_config(resource_type: &str) -> Option<&'static ResourceConfig> {
    CONFIGS.iter().find(|c| c.resource_type == resource_type)
}

/// Resource type backed by a [`ResourceConfig`]
pub struct AwsccResourceType {
    config: &'static ResourceConfig,
}

impl ResourceType for AwsccResourceType {
    fn name(&self) -> &'static str {
        self.config.resource_type
    }

    fn schema(&self) -> ResourceSchema {
        (self.config.schema)()
    }
}

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    CONFIGS
        .iter()
        .map(|config| Box::new(AwsccResourceType { config }) as Box<dyn ResourceType>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resource_type_names_are_unique() {
        let names: HashSet<_> = CONFIGS.iter().map(|c| c.resource_type).collect();
        assert_eq!(names.len(), CONFIGS.len());
    }

    #[test]
    fn schema_names_match_resource_types() {
        for config in CONFIGS {
            let schema = (config.schema)();
            assert_eq!(schema.resource_type, config.resource_type);
            assert_eq!(schema.attributes.contains_key("tags"), config.has_tags);
        }
    }

    #[test]
    fn waits_are_ordered() {
        for config in CONFIGS {
            assert!(config.wait.delay < config.wait.timeout);
            assert!(config.wait.poll_interval < config.wait.timeout);
        }
        let nat = get_config("ec2_nat_gateway").unwrap();
        let vpc = get_config("ec2_vpc").unwrap();
        assert!(nat.wait.timeout > vpc.wait.timeout);
    }

    #[test]
    fn lookup_unknown_type() {
        assert!(get_config("s3_bucket").is_none());
        assert_eq!(resource_types().len(), CONFIGS.len());
    }
}
