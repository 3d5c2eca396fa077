use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::fetchers::{enabled_disabled, primary, Error, FetchContext};
use crate::naming::{detect_environment, detect_environment_loose, Environment, ResourceKind};
use crate::spec::{SpecDocument, SpecRecord};

const METRIC_ALERTS_API: &str = "2018-03-01";

/// Metric names that tie an alert to one of the dependent resources even
/// when its scopes do not name them directly.
const METRIC_MARKERS: [&str; 4] = [
    "dtu_consumption_percent",
    "usedmemorypercentage",
    "cpupercentage",
    "serverload",
];

#[derive(Debug, Deserialize)]
struct MetricAlert {
    name: String,
    #[serde(default)]
    properties: MetricAlertProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct MetricAlertProperties {
    enabled: bool,
    scopes: Vec<String>,
    criteria: Option<Value>,
}

fn scope_matches(scopes: &[String], targets: &[String]) -> bool {
    return scopes.iter().any(|scope| {
        targets
            .iter()
            .any(|target| scope.eq_ignore_ascii_case(target))
    });
}

fn criteria_matches(criteria: &Option<Value>) -> bool {
    let raw = match criteria {
        Some(value) => match serde_json::to_string(value) {
            Ok(raw) => raw.to_lowercase(),
            Err(_) => return false,
        },
        None => return false,
    };

    return METRIC_MARKERS.iter().any(|marker| raw.contains(marker));
}

/// Name-pattern match for alerts like `cpu-usage-80`.
fn name_pattern_matches(name: &str) -> bool {
    let lowered = name.to_lowercase();
    let marker = "cpu-usage-";

    return match lowered.find(marker) {
        Some(index) => lowered[index + marker.len()..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false),
        None => false,
    };
}

fn references_target(alert: &MetricAlert, targets: &[String]) -> bool {
    return scope_matches(&alert.properties.scopes, targets)
        || criteria_matches(&alert.properties.criteria)
        || name_pattern_matches(&alert.name);
}

/// Alerts may live in other resource groups, so the environment filter runs
/// against each alert's own name with the loose substring rule. When the run
/// environment is unknown, every environment tag passes.
fn environment_matches(run_environment: Environment, alert_name: &str) -> bool {
    return match run_environment {
        Environment::Unknown => true,
        expected => detect_environment_loose(alert_name) == expected,
    };
}

pub async fn fetch(ctx: &FetchContext<'_>) -> Result<PathBuf, Error> {
    let subscription_path = ctx
        .client
        .subscription_path("/providers/Microsoft.Insights/metricAlerts");

    let alerts: Vec<MetricAlert> = primary(
        &ctx.names.base,
        ctx.client.list(&subscription_path, METRIC_ALERTS_API).await,
    )?;

    let targets = vec![
        ctx.client.resource_path(
            ctx.groups.for_kind(ResourceKind::WebApp),
            &format!("Microsoft.Web/serverfarms/{}", ctx.names.app_service_plan),
        ),
        format!(
            "{}/databases/{}",
            ctx.client.resource_path(
                ctx.groups.for_kind(ResourceKind::Database),
                &format!("Microsoft.Sql/servers/{}", ctx.names.sql_server),
            ),
            ctx.names.sql_database
        ),
        ctx.client.resource_path(
            ctx.groups.for_kind(ResourceKind::Cache),
            &format!("Microsoft.Cache/redis/{}", ctx.names.cache),
        ),
    ];

    let run_environment = detect_environment(&ctx.names.base);

    let records: Vec<SpecRecord> = alerts
        .iter()
        .filter(|alert| environment_matches(run_environment, &alert.name))
        .filter(|alert| references_target(alert, &targets))
        .map(|alert| {
            SpecRecord::new(
                detect_environment_loose(&alert.name).label(),
                alert.name.as_str(),
                enabled_disabled(alert.properties.enabled),
            )
        })
        .collect();

    let path = ctx.output_dir.join(ResourceKind::Alerts.data_file());
    SpecDocument::new(records).write(&path)?;
    info!(resource = %ctx.names.base, file = %path.display(), "alert specification written");

    return Ok(path);
}
