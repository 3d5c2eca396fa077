use std::path::PathBuf;

use serde::Deserialize;
use tracing::{info, warn};

use crate::fetchers::{
    defender_state, diagnostics_summary, enabled_disabled, optional, primary, DefenderPlan,
    DiagnosticsSummary, Error, FetchContext,
};
use crate::firewall::FirewallSession;
use crate::naming::ResourceKind;
use crate::spec::{SpecDocument, SpecRecord};

const SQL_API: &str = "2021-11-01";

#[derive(Debug, Deserialize)]
struct Server {
    location: String,
    #[serde(default)]
    properties: ServerProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ServerProperties {
    version: Option<String>,
    minimal_tls_version: Option<String>,
    public_network_access: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Database {
    id: String,
    sku: Option<DatabaseSku>,
    #[serde(default)]
    properties: DatabaseProperties,
}

#[derive(Debug, Deserialize)]
struct DatabaseSku {
    name: Option<String>,
    tier: Option<String>,
    capacity: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct DatabaseProperties {
    max_size_bytes: Option<i64>,
    zone_redundant: Option<bool>,
    collation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RetentionPolicy {
    #[serde(default)]
    properties: RetentionProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RetentionProperties {
    retention_days: Option<i64>,
    weekly_retention: Option<String>,
    monthly_retention: Option<String>,
    yearly_retention: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AuditPolicy {
    #[serde(default)]
    properties: AuditProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct AuditProperties {
    state: Option<String>,
    storage_endpoint: Option<String>,
    is_azure_monitor_target_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct DatabaseUsage {
    name: Option<String>,
    #[serde(default)]
    properties: UsageProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct UsageProperties {
    current_value: Option<f64>,
}

/// DTU tiers report their capacity in DTUs, vCore tiers in cores.
fn capacity_label(sku: &Option<DatabaseSku>) -> String {
    let sku = match sku {
        Some(sku) => sku,
        None => return String::from("-"),
    };
    let capacity = match sku.capacity {
        Some(capacity) => capacity,
        None => return String::from("-"),
    };

    let dtu_tier = matches!(
        sku.tier.as_deref(),
        Some("Basic") | Some("Standard") | Some("Premium")
    );
    if dtu_tier {
        return format!("{} DTU", capacity);
    }
    return format!("{} vCore(s)", capacity);
}

fn sku_label(sku: &Option<DatabaseSku>) -> String {
    return match sku {
        Some(sku) => match (&sku.tier, &sku.name) {
            (Some(tier), Some(name)) => format!("{} ({})", tier, name),
            (Some(tier), None) => tier.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => String::from("-"),
        },
        None => String::from("-"),
    };
}

fn max_size_label(max_size_bytes: Option<i64>) -> String {
    return match max_size_bytes {
        Some(bytes) => format!("{} GB", bytes / (1024 * 1024 * 1024)),
        None => String::from("-"),
    };
}

/// ISO-8601 retention durations; `PT0S` and absence both mean "off".
fn retention_label(retention: &Option<String>) -> String {
    return match retention.as_deref() {
        Some("PT0S") | Some("") | None => String::from("-"),
        Some(value) => value.to_string(),
    };
}

fn short_term_label(retention_days: Option<i64>) -> String {
    return match retention_days {
        Some(days) => format!("{} day(s)", days),
        None => String::from("-"),
    };
}

fn audit_destination(properties: &AuditProperties) -> String {
    if properties.is_azure_monitor_target_enabled.unwrap_or(false) {
        return String::from("Log Analytics");
    }
    return match &properties.storage_endpoint {
        Some(endpoint) if !endpoint.is_empty() => endpoint.clone(),
        _ => String::from("-"),
    };
}

fn used_space_label(usages: &[DatabaseUsage]) -> String {
    let size = usages
        .iter()
        .find(|usage| usage.name.as_deref() == Some("database_size"))
        .and_then(|usage| usage.properties.current_value);

    return match size {
        Some(bytes) => format!("{:.1} GB", bytes / (1024.0 * 1024.0 * 1024.0)),
        None => String::from("-"),
    };
}

pub async fn fetch(ctx: &FetchContext<'_>) -> Result<PathBuf, Error> {
    let resource_group = ctx.groups.for_kind(ResourceKind::Database);
    let server_name = &ctx.names.sql_server;
    let database_name = &ctx.names.sql_database;

    let server_path = ctx.client.resource_path(
        resource_group,
        &format!("Microsoft.Sql/servers/{}", server_name),
    );
    let database_path = format!("{}/databases/{}", server_path, database_name);

    let server: Server = primary(server_name, ctx.client.get(&server_path, SQL_API).await)?;
    let database: Database =
        primary(database_name, ctx.client.get(&database_path, SQL_API).await)?;

    let short_term = optional(
        database_name,
        "short term retention",
        ctx.client.get::<RetentionPolicy>(
            &format!("{}/backupShortTermRetentionPolicies/default", database_path),
            SQL_API,
        ),
        RetentionPolicy::default(),
    )
    .await;

    let long_term = optional(
        database_name,
        "long term retention",
        ctx.client.get::<RetentionPolicy>(
            &format!("{}/backupLongTermRetentionPolicies/default", database_path),
            SQL_API,
        ),
        RetentionPolicy::default(),
    )
    .await;

    let audit = optional(
        database_name,
        "audit policy",
        ctx.client
            .get::<AuditPolicy>(&format!("{}/auditingSettings/default", database_path), SQL_API),
        AuditPolicy::default(),
    )
    .await;

    // Usage figures are only reachable once our public IP is allowed
    // through the server firewall. The session is scoped to this lookup.
    let usages = if ctx.database.ensure_firewall_access {
        let session = FirewallSession::open(
            ctx.client,
            resource_group,
            server_name,
            &ctx.database.firewall_rule_prefix,
        )
        .await;

        match session {
            Ok(session) => {
                let usages = optional(
                    database_name,
                    "database usages",
                    ctx.client
                        .list::<DatabaseUsage>(&format!("{}/usages", database_path), SQL_API),
                    Vec::new(),
                )
                .await;
                session.close().await;
                usages
            }
            Err(error) => {
                warn!(resource = %server_name, %error, "firewall session unavailable, skipping usage lookup");
                Vec::new()
            }
        }
    } else {
        optional(
            database_name,
            "database usages",
            ctx.client
                .list::<DatabaseUsage>(&format!("{}/usages", database_path), SQL_API),
            Vec::new(),
        )
        .await
    };

    let diagnostics = optional(
        database_name,
        "diagnostic settings",
        diagnostics_summary(ctx.client, &database.id),
        DiagnosticsSummary::disabled(),
    )
    .await;

    let defender = defender_state(ctx.client, server_name, DefenderPlan::SqlServers).await;

    let display = |value: &Option<String>| -> String {
        return value.clone().unwrap_or_else(|| String::from("-"));
    };

    let records = vec![
        SpecRecord::new("General", "Resource group", resource_group),
        SpecRecord::new("General", "Location", server.location.as_str()),
        SpecRecord::new("General", "Server name", server_name.as_str()),
        SpecRecord::new(
            "General",
            "Server version",
            display(&server.properties.version),
        ),
        SpecRecord::new(
            "General",
            "Public network access",
            display(&server.properties.public_network_access),
        ),
        SpecRecord::new("Database", "Database name", database_name.as_str()),
        SpecRecord::new("Database", "Pricing tier", sku_label(&database.sku)),
        SpecRecord::new("Database", "Capacity", capacity_label(&database.sku)),
        SpecRecord::new(
            "Database",
            "Max size",
            max_size_label(database.properties.max_size_bytes),
        ),
        SpecRecord::new("Database", "Used space", used_space_label(&usages)),
        SpecRecord::new(
            "Database",
            "Zone redundant",
            enabled_disabled(database.properties.zone_redundant.unwrap_or(false)),
        ),
        SpecRecord::new(
            "Database",
            "Collation",
            display(&database.properties.collation),
        ),
        SpecRecord::new(
            "Backup",
            "Point-in-time restore",
            short_term_label(short_term.properties.retention_days),
        ),
        SpecRecord::new(
            "Backup",
            "Weekly long-term retention",
            retention_label(&long_term.properties.weekly_retention),
        ),
        SpecRecord::new(
            "Backup",
            "Monthly long-term retention",
            retention_label(&long_term.properties.monthly_retention),
        ),
        SpecRecord::new(
            "Backup",
            "Yearly long-term retention",
            retention_label(&long_term.properties.yearly_retention),
        ),
        SpecRecord::new(
            "Security",
            "Minimal TLS version",
            display(&server.properties.minimal_tls_version),
        ),
        SpecRecord::new(
            "Security",
            "Auditing",
            match audit.properties.state.as_deref() {
                Some("Enabled") => "Enabled",
                _ => "Disabled",
            },
        ),
        SpecRecord::new(
            "Security",
            "Audit destination",
            audit_destination(&audit.properties),
        ),
        SpecRecord::new("Security", "Defender for SQL", defender),
        SpecRecord::new("Monitoring", "Diagnostic settings", diagnostics.state.as_str()),
        SpecRecord::new("Monitoring", "Diagnostic destination", diagnostics.destination.as_str()),
    ];

    let path = ctx.output_dir.join(ResourceKind::Database.data_file());
    SpecDocument::new(records).write(&path)?;
    info!(resource = %database_name, file = %path.display(), "database specification written");

    return Ok(path);
}
