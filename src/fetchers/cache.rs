use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use crate::fetchers::{
    diagnostics_summary, enabled_disabled, optional, primary, DiagnosticsSummary, Error,
    FetchContext,
};
use crate::naming::ResourceKind;
use crate::spec::{SpecDocument, SpecRecord};

const REDIS_API: &str = "2023-08-01";

#[derive(Debug, Deserialize)]
struct Redis {
    id: String,
    location: String,
    #[serde(default)]
    properties: RedisProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RedisProperties {
    redis_version: Option<String>,
    sku: RedisSku,
    enable_non_ssl_port: Option<bool>,
    minimum_tls_version: Option<String>,
    public_network_access: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RedisSku {
    name: Option<String>,
    family: Option<String>,
    capacity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCapacity {
    pub memory: String,
    pub connections: String,
}

/// Published capacity figures per Redis tier. Unknown combinations fall back
/// to a constructed `"{name} {family}{capacity}"` label with `-` connections.
pub fn cache_capacity(name: &str, family: &str, capacity: i64) -> CacheCapacity {
    let known: Option<(&str, &str)> = match (name, family.to_uppercase().as_str(), capacity) {
        ("Basic" | "Standard", "C", 0) => Some(("250 MB", "256")),
        ("Basic" | "Standard", "C", 1) => Some(("1 GB", "1,000")),
        ("Basic" | "Standard", "C", 2) => Some(("2.5 GB", "2,000")),
        ("Basic" | "Standard", "C", 3) => Some(("6 GB", "5,000")),
        ("Basic" | "Standard", "C", 4) => Some(("13 GB", "10,000")),
        ("Basic" | "Standard", "C", 5) => Some(("26 GB", "15,000")),
        ("Basic" | "Standard", "C", 6) => Some(("53 GB", "20,000")),
        ("Premium", "P", 1) => Some(("6 GB", "7,500")),
        ("Premium", "P", 2) => Some(("13 GB", "15,000")),
        ("Premium", "P", 3) => Some(("26 GB", "30,000")),
        ("Premium", "P", 4) => Some(("53 GB", "40,000")),
        ("Premium", "P", 5) => Some(("120 GB", "40,000")),
        _ => None,
    };

    return match known {
        Some((memory, connections)) => CacheCapacity {
            memory: memory.to_string(),
            connections: connections.to_string(),
        },
        None => CacheCapacity {
            memory: format!("{} {}{}", name, family, capacity),
            connections: String::from("-"),
        },
    };
}

fn sku_label(sku: &RedisSku) -> String {
    let name = sku.name.as_deref().unwrap_or("-");
    let family = sku.family.as_deref().unwrap_or("");
    let capacity = sku
        .capacity
        .map(|c| c.to_string())
        .unwrap_or_default();
    return format!("{} {}{}", name, family, capacity).trim_end().to_string();
}

pub async fn fetch(ctx: &FetchContext<'_>) -> Result<PathBuf, Error> {
    let resource_group = ctx.groups.for_kind(ResourceKind::Cache);
    let cache_name = &ctx.names.cache;

    let cache_path = ctx.client.resource_path(
        resource_group,
        &format!("Microsoft.Cache/redis/{}", cache_name),
    );

    let redis: Redis = primary(cache_name, ctx.client.get(&cache_path, REDIS_API).await)?;

    let capacity = cache_capacity(
        redis.properties.sku.name.as_deref().unwrap_or(""),
        redis.properties.sku.family.as_deref().unwrap_or(""),
        redis.properties.sku.capacity.unwrap_or(-1),
    );

    let diagnostics = optional(
        cache_name,
        "diagnostic settings",
        diagnostics_summary(ctx.client, &redis.id),
        DiagnosticsSummary::disabled(),
    )
    .await;

    let display = |value: &Option<String>| -> String {
        return value.clone().unwrap_or_else(|| String::from("-"));
    };

    let records = vec![
        SpecRecord::new("General", "Resource group", resource_group),
        SpecRecord::new("General", "Location", redis.location.as_str()),
        SpecRecord::new(
            "General",
            "Redis version",
            display(&redis.properties.redis_version),
        ),
        SpecRecord::new("Capacity", "Pricing tier", sku_label(&redis.properties.sku)),
        SpecRecord::new("Capacity", "Memory size", capacity.memory.as_str()),
        SpecRecord::new("Capacity", "Max client connections", capacity.connections.as_str()),
        SpecRecord::new(
            "Security",
            "Non-SSL port",
            enabled_disabled(redis.properties.enable_non_ssl_port.unwrap_or(false)),
        ),
        SpecRecord::new(
            "Security",
            "Minimum TLS version",
            display(&redis.properties.minimum_tls_version),
        ),
        SpecRecord::new(
            "Security",
            "Public network access",
            display(&redis.properties.public_network_access),
        ),
        SpecRecord::new("Monitoring", "Diagnostic settings", diagnostics.state.as_str()),
        SpecRecord::new("Monitoring", "Diagnostic destination", diagnostics.destination.as_str()),
    ];

    let path = ctx.output_dir.join(ResourceKind::Cache.data_file());
    SpecDocument::new(records).write(&path)?;
    info!(resource = %cache_name, file = %path.display(), "cache specification written");

    return Ok(path);
}
