use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;

use stratus_core::context::{OperationContext, ProviderConfig};
use stratus_core::provider::Provider;
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::schema::AttributeType;
use stratus_provider_awscc::resources::get_config;
use stratus_provider_awscc::{AwsccProvider, normalize_region};

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Manage AWS resources through Cloud Control, waiting for each change to settle", long_about = None)]
struct Cli {
    /// Path to a JSON provider configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// AWS region (overrides the configuration file)
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current state of a resource
    Read {
        /// Resource type (e.g., ec2_vpc)
        resource_type: String,
        /// Vendor identifier (e.g., vpc-0123456789abcdef0)
        identifier: String,
        #[arg(long, default_value = "default")]
        name: String,
    },
    /// Create a resource and wait until it is available
    Create {
        resource_type: String,
        /// Logical name used in logs and output
        name: String,
        /// Attribute as key=value (repeatable)
        #[arg(long = "attr", value_parser = parse_key_value)]
        attrs: Vec<(String, String)>,
        /// Tag as key=value (repeatable)
        #[arg(long = "tag", value_parser = parse_key_value)]
        tags: Vec<(String, String)>,
    },
    /// Update a resource in place and wait for the change to apply
    Update {
        resource_type: String,
        identifier: String,
        #[arg(long, default_value = "default")]
        name: String,
        #[arg(long = "attr", value_parser = parse_key_value)]
        attrs: Vec<(String, String)>,
        #[arg(long = "tag", value_parser = parse_key_value)]
        tags: Vec<(String, String)>,
    },
    /// Delete a resource and wait until it is gone
    Delete {
        resource_type: String,
        identifier: String,
        #[arg(long, default_value = "default")]
        name: String,
    },
    /// Wait for an operation that was started elsewhere
    Wait {
        resource_type: String,
        /// Cloud Control request token
        request_token: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.region.as_deref())?;
    let provider = AwsccProvider::new(&config.region)
        .await
        .with_rate_limit(config.rate_limit_per_sec);
    let ctx = OperationContext::new(Arc::new(config));
    log::debug!("[{}] using region {}", ctx.log_id, ctx.config.region);

    match cli.command {
        Commands::Read {
            resource_type,
            identifier,
            name,
        } => {
            let id = ResourceId::new(resource_type, name);
            let state = provider.read(&ctx, &id, Some(identifier.as_str())).await?;
            if !state.exists {
                println!("{} {} ({})", "Not found:".yellow().bold(), id, identifier);
                return Ok(());
            }
            print_state(&state)
        }
        Commands::Create {
            resource_type,
            name,
            attrs,
            tags,
        } => {
            let resource = build_resource(&resource_type, &name, attrs, tags)?;
            println!("{} {}", "Creating".cyan().bold(), resource.id);
            let state = provider.create(&ctx, &resource).await?;
            println!("{} {}", "✓ Created".green().bold(), resource.id);
            print_state(&state)
        }
        Commands::Update {
            resource_type,
            identifier,
            name,
            attrs,
            tags,
        } => {
            let resource = build_resource(&resource_type, &name, attrs, tags)?;
            let from = provider.read(&ctx, &resource.id, Some(identifier.as_str())).await?;
            if !from.exists {
                bail!("{} ({}) does not exist", resource.id, identifier);
            }
            println!("{} {}", "Updating".cyan().bold(), resource.id);
            let state = provider
                .update(&ctx, &resource.id, &identifier, &from, &resource)
                .await?;
            println!("{} {}", "✓ Updated".green().bold(), resource.id);
            print_state(&state)
        }
        Commands::Delete {
            resource_type,
            identifier,
            name,
        } => {
            let id = ResourceId::new(resource_type, name);
            println!("{} {} ({})", "Deleting".cyan().bold(), id, identifier);
            provider.delete(&ctx, &id, &identifier).await?;
            println!("{} {}", "✓ Deleted".green().bold(), id);
            Ok(())
        }
        Commands::Wait {
            resource_type,
            request_token,
        } => {
            let event = provider
                .wait_for_request(&ctx, &resource_type, &request_token)
                .await?;
            println!(
                "{} {} {}",
                "✓".green().bold(),
                request_token,
                event.status
            );
            if let Some(identifier) = event.identifier {
                println!("  identifier: {}", identifier);
            }
            Ok(())
        }
    }
}

/// Load the provider configuration, applying the command-line region
fn load_config(path: Option<&Path>, region: Option<&str>) -> Result<ProviderConfig> {
    let config = match path {
        Some(path) => ProviderConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProviderConfig::default(),
    };
    Ok(match region {
        Some(region) => config.with_region(normalize_region(region)),
        None => config,
    })
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// Interpret a command-line value by its attribute type
fn parse_value(raw: &str, attr_type: &AttributeType) -> Result<Value> {
    Ok(match attr_type {
        AttributeType::String | AttributeType::Enum(_) => Value::String(raw.to_string()),
        AttributeType::Int => Value::Int(
            raw.trim()
                .parse()
                .with_context(|| format!("'{}' is not an integer", raw))?,
        ),
        AttributeType::Bool => Value::Bool(
            raw.trim()
                .parse()
                .with_context(|| format!("'{}' is not a bool", raw))?,
        ),
        AttributeType::Custom { base, .. } => parse_value(raw, base)?,
        AttributeType::List(item) => Value::List(
            list_items(raw)
                .map(|s| parse_value(s, item))
                .collect::<Result<_>>()?,
        ),
        AttributeType::Map(_) => bail!("map values cannot be given as a single attribute"),
    })
}

/// Best-effort reading of a value for a key the schema does not know
fn guess_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if raw.starts_with('[') && raw.ends_with(']') {
        return Value::List(
            list_items(raw)
                .map(|s| Value::String(s.to_string()))
                .collect(),
        );
    }
    Value::String(raw.to_string())
}

/// Comma-separated items, optionally wrapped in brackets
fn list_items(raw: &str) -> impl Iterator<Item = &str> {
    let inner = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .unwrap_or(raw);
    inner.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn build_resource(
    resource_type: &str,
    name: &str,
    attrs: Vec<(String, String)>,
    tags: Vec<(String, String)>,
) -> Result<Resource> {
    let config =
        get_config(resource_type).ok_or_else(|| anyhow!("Unknown resource type: {}", resource_type))?;

    let schema = (config.schema)();

    let mut resource = Resource::new(resource_type, name);
    for (key, raw) in attrs {
        let value = match schema.attributes.get(&key) {
            Some(attr) => parse_value(&raw, &attr.attr_type)
                .with_context(|| format!("{}.{}", resource.id, key))?,
            None => guess_value(&raw),
        };
        resource = resource.with_attribute(key, value);
    }
    if !tags.is_empty() {
        let tags: HashMap<String, Value> = tags
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        resource = resource.with_attribute("tags", Value::Map(tags));
    }

    if let Err(errors) = schema.validate(&resource.attributes) {
        let details: Vec<String> = errors
            .iter()
            .map(|e| format!("{}: {}", resource.id, e))
            .collect();
        bail!("Validation failed:\n  {}", details.join("\n  "));
    }
    Ok(resource)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

fn state_to_json(state: &State) -> serde_json::Value {
    let attributes: serde_json::Map<String, serde_json::Value> = state
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    serde_json::json!({
        "resource": state.id.to_string(),
        "identifier": state.identifier,
        "attributes": attributes,
    })
}

fn print_state(state: &State) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&state_to_json(state))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_key_value_pairs() {
        assert_eq!(
            parse_key_value("cidr_block=10.0.0.0/16"),
            Ok(("cidr_block".to_string(), "10.0.0.0/16".to_string()))
        );
        assert_eq!(
            parse_key_value("name=a=b"),
            Ok(("name".to_string(), "a=b".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn values_follow_the_attribute_type() {
        assert_eq!(
            parse_value("2024", &AttributeType::String).unwrap(),
            Value::String("2024".to_string())
        );
        assert_eq!(
            parse_value("true", &AttributeType::Enum(vec!["true".to_string()])).unwrap(),
            Value::String("true".to_string())
        );
        assert_eq!(parse_value("42", &AttributeType::Int).unwrap(), Value::Int(42));
        assert_eq!(parse_value("false", &AttributeType::Bool).unwrap(), Value::Bool(false));
        assert_eq!(
            parse_value("rtb-1, rtb-2", &AttributeType::List(Box::new(AttributeType::String)))
                .unwrap(),
            Value::List(vec![
                Value::String("rtb-1".to_string()),
                Value::String("rtb-2".to_string()),
            ])
        );
        assert_eq!(
            parse_value("[1,2]", &AttributeType::List(Box::new(AttributeType::Int))).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );

        assert!(parse_value("ten", &AttributeType::Int).is_err());
        assert!(parse_value("yes", &AttributeType::Bool).is_err());
    }

    #[test]
    fn unknown_keys_are_guessed() {
        assert_eq!(guess_value("true"), Value::Bool(true));
        assert_eq!(guess_value("42"), Value::Int(42));
        assert_eq!(guess_value("vpc-1"), Value::String("vpc-1".to_string()));
        assert_eq!(
            guess_value("[rtb-1, rtb-2]"),
            Value::List(vec![
                Value::String("rtb-1".to_string()),
                Value::String("rtb-2".to_string()),
            ])
        );
    }

    #[test]
    fn numeric_looking_string_attribute_stays_a_string() {
        let resource = build_resource(
            "ec2_security_group",
            "sg",
            vec![("group_description".to_string(), "2024".to_string())],
            vec![],
        )
        .unwrap();
        assert_eq!(
            resource.attributes.get("group_description"),
            Some(&Value::String("2024".to_string()))
        );
    }

    #[test]
    fn bad_bool_attribute_names_the_attribute() {
        let err = build_resource(
            "ec2_vpc",
            "main",
            vec![
                ("cidr_block".to_string(), "10.0.0.0/16".to_string()),
                ("enable_dns_support".to_string(), "maybe".to_string()),
            ],
            vec![],
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("ec2_vpc.main.enable_dns_support"));
    }

    #[test]
    fn build_resource_validates_against_schema() {
        let resource = build_resource(
            "ec2_vpc",
            "main",
            vec![("cidr_block".to_string(), "10.0.0.0/16".to_string())],
            vec![("Name".to_string(), "main".to_string())],
        )
        .unwrap();
        assert!(resource.attributes.contains_key("tags"));

        let err = build_resource(
            "ec2_vpc",
            "main",
            vec![("cidr_block".to_string(), "10.0.0.0".to_string())],
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Validation failed"));

        assert!(build_resource("s3_bucket", "logs", vec![], vec![]).is_err());
    }

    #[test]
    fn region_flag_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"region": "eu-west-1", "write_timeout_secs": 600}}"#).unwrap();

        let config = load_config(Some(file.path()), None).unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.write_timeout_secs, 600);

        let config = load_config(Some(file.path()), Some("ap_northeast_1")).unwrap();
        assert_eq!(config.region, "ap-northeast-1");
        assert_eq!(config.write_timeout_secs, 600);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/stratus.json")), None).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/stratus.json"));
    }

    #[test]
    fn state_is_printed_as_json() {
        let mut attributes = HashMap::new();
        attributes.insert("cidr_block".to_string(), Value::String("10.0.0.0/16".to_string()));
        let state = State::existing(ResourceId::new("ec2_vpc", "main"), attributes)
            .with_identifier("vpc-1");

        let json = state_to_json(&state);

        assert_eq!(json["resource"], "ec2_vpc.main");
        assert_eq!(json["identifier"], "vpc-1");
        assert_eq!(json["attributes"]["cidr_block"], "10.0.0.0/16");
    }
}
