use std::future::Future;
use std::path::{Path, PathBuf};

use futures::future::{join_all, FutureExt};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::arm::{self, ArmClient, ResourceId};
use crate::config::DatabaseConfig;
use crate::naming::{ResourceGroups, ResourceNames};
use crate::spec;

pub mod alerts;
pub mod cache;
pub mod database;
pub mod storage;
pub mod web_app;

const DIAGNOSTICS_API: &str = "2021-05-01-preview";
const SECURITY_PRICINGS_API: &str = "2023-01-01";
const AUTOSCALE_API: &str = "2022-10-01";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Primary lookup for {resource} failed: {source}")]
    Primary {
        resource: String,
        #[source]
        source: arm::Error,
    },

    #[error(transparent)]
    Persist(#[from] spec::Error),
}

/// Everything a fetcher needs, resolved once per run and read-only.
pub struct FetchContext<'a> {
    pub client: &'a ArmClient,
    pub names: &'a ResourceNames,
    pub groups: &'a ResourceGroups,
    pub output_dir: &'a Path,
    pub database: &'a DatabaseConfig,
}

/// Runs all fetchers concurrently. The join is all-or-nothing: every fetcher
/// runs to completion, then the first failure (if any) aborts the run before
/// the render stage.
pub async fn run_all(ctx: &FetchContext<'_>) -> Result<Vec<PathBuf>, Error> {
    let jobs: Vec<futures::future::BoxFuture<'_, Result<PathBuf, Error>>> = vec![
        web_app::fetch(ctx).boxed(),
        database::fetch(ctx).boxed(),
        cache::fetch(ctx).boxed(),
        storage::fetch(ctx).boxed(),
        alerts::fetch(ctx).boxed(),
    ];

    let results = join_all(jobs).await;
    let written = results.into_iter().collect::<Result<Vec<_>, _>>()?;

    info!(files = written.len(), "all resource fetchers completed");
    return Ok(written);
}

/// Wraps the primary lookup of a fetcher: failure is logged with the
/// resource name and re-thrown, aborting that fetcher.
pub(crate) fn primary<T>(resource: &str, result: Result<T, arm::Error>) -> Result<T, Error> {
    return result.map_err(|source| {
        error!(resource, %source, "primary resource lookup failed");
        Error::Primary {
            resource: resource.to_string(),
            source,
        }
    });
}

/// Wraps an optional enrichment call: failure is logged as a warning and
/// replaced by the supplied default, never propagated. Downstream derivation
/// code therefore only ever sees an explicit value.
pub(crate) async fn optional<T, E, F>(resource: &str, call: &str, future: F, default: T) -> T
where
    E: std::fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    return match future.await {
        Ok(value) => value,
        Err(error) => {
            warn!(resource, call, %error, "optional lookup failed, using default");
            default
        }
    };
}

pub(crate) fn enabled_disabled(value: bool) -> &'static str {
    if value {
        return "Enabled";
    }
    return "Disabled";
}

/// Scaling method inference for an app service plan.
pub fn scaling_method(rules_based: bool, elastic: bool, capacity: i64) -> String {
    if rules_based {
        return String::from("Rules Based");
    }
    if elastic {
        return String::from("Automatic");
    }
    return format!("Manual ({} instance(s))", capacity);
}

/// True when any autoscale setting in the resource group targets the given
/// resource id.
pub(crate) async fn has_autoscale_rules(
    client: &ArmClient,
    resource_group: &str,
    target: &ResourceId,
) -> Result<bool, arm::Error> {
    #[derive(Deserialize)]
    struct Autoscale {
        properties: AutoscaleProperties,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct AutoscaleProperties {
        target_resource_uri: Option<String>,
    }

    let path = client.resource_path(resource_group, "Microsoft.Insights/autoscalesettings");
    let settings: Vec<Autoscale> = client.list(&path, AUTOSCALE_API).await?;

    let matched = settings.iter().any(|setting| {
        return match &setting.properties.target_resource_uri {
            Some(uri) => target.matches(uri),
            None => false,
        };
    });

    return Ok(matched);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsSummary {
    pub state: String,
    pub destination: String,
}

impl DiagnosticsSummary {
    pub fn disabled() -> Self {
        return Self {
            state: String::from("Disabled"),
            destination: String::from("-"),
        };
    }
}

/// Summarizes the diagnostic settings attached to a resource: whether any
/// setting exists, whether it covers every log category, and where it ships
/// the data (workspace wins over storage account wins over event hub).
pub(crate) async fn diagnostics_summary(
    client: &ArmClient,
    resource_id: &str,
) -> Result<DiagnosticsSummary, arm::Error> {
    #[derive(Deserialize)]
    struct Setting {
        properties: SettingProperties,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    struct SettingProperties {
        workspace_id: Option<String>,
        storage_account_id: Option<String>,
        event_hub_name: Option<String>,
        logs: Vec<LogSetting>,
    }

    #[derive(Deserialize, Default)]
    struct LogSetting {
        #[serde(default)]
        enabled: bool,
    }

    let path = format!("{}/providers/Microsoft.Insights/diagnosticSettings", resource_id);
    let settings: Vec<Setting> = client.list(&path, DIAGNOSTICS_API).await?;

    let setting = match settings.first() {
        Some(setting) => setting,
        None => return Ok(DiagnosticsSummary::disabled()),
    };

    let all_logs = !setting.properties.logs.is_empty()
        && setting.properties.logs.iter().all(|log| log.enabled);
    let state = if all_logs { "Enable all logs" } else { "Enabled" };

    let destination = diagnostics_destination(
        &setting.properties.workspace_id,
        &setting.properties.storage_account_id,
        &setting.properties.event_hub_name,
    );

    return Ok(DiagnosticsSummary {
        state: state.to_string(),
        destination,
    });
}

fn diagnostics_destination(
    workspace_id: &Option<String>,
    storage_account_id: &Option<String>,
    event_hub_name: &Option<String>,
) -> String {
    if let Some(workspace) = workspace_id {
        return match ResourceId::parse(workspace) {
            Ok(id) => format!("Log Analytics workspace {}", id.name()),
            Err(_) => workspace.clone(),
        };
    }
    if let Some(account) = storage_account_id {
        return match ResourceId::parse(account) {
            Ok(id) => format!("Storage account {}", id.name()),
            Err(_) => account.clone(),
        };
    }
    if let Some(hub) = event_hub_name {
        return format!("Event hub {}", hub);
    }

    return String::from("-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefenderPlan {
    AppServices,
    SqlServers,
    StorageAccounts,
}

impl DefenderPlan {
    fn arm_name(&self) -> &'static str {
        return match self {
            DefenderPlan::AppServices => "AppServices",
            DefenderPlan::SqlServers => "SqlServers",
            DefenderPlan::StorageAccounts => "StorageAccounts",
        };
    }
}

/// Maps a Defender pricing tier to the display state. Tier `Standard` means
/// the plan is active; for the compute plan the reference behavior also
/// treats `Free` as active, and that quirk is kept as-is.
pub fn defender_display(plan: DefenderPlan, tier: &str) -> &'static str {
    if tier == "Standard" {
        return "Enabled";
    }
    if plan == DefenderPlan::AppServices && tier == "Free" {
        return "Enabled";
    }
    return "Disabled";
}

/// Resolves the Defender plan state for a subscription. A failed pricing
/// lookup is recoverable and reads as `Disabled`.
pub(crate) async fn defender_state(client: &ArmClient, resource: &str, plan: DefenderPlan) -> String {
    #[derive(Deserialize)]
    struct Pricing {
        properties: PricingProperties,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PricingProperties {
        pricing_tier: String,
    }

    let path = client.subscription_path(&format!(
        "/providers/Microsoft.Security/pricings/{}",
        plan.arm_name()
    ));

    let tier = optional(
        resource,
        "defender pricing",
        async {
            let pricing: Pricing = client.get(&path, SECURITY_PRICINGS_API).await?;
            Ok::<String, arm::Error>(pricing.properties.pricing_tier)
        },
        String::new(),
    )
    .await;

    return defender_display(plan, &tier).to_string();
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::defender_display;
    use super::diagnostics_summary;
    use super::optional;
    use super::scaling_method;
    use super::testing::FakeTransport;
    use super::DefenderPlan;
    use super::DiagnosticsSummary;
    use crate::arm::{self, ArmClient};

    #[tokio::test]
    async fn optional_returns_value_on_success() {
        let value = optional(
            "res",
            "call",
            async { Ok::<i32, arm::Error>(7) },
            0,
        )
        .await;
        assert_eq!(7, value);
    }

    #[tokio::test]
    async fn optional_substitutes_default_on_failure() {
        let value = optional(
            "res",
            "call",
            async {
                Err::<&str, arm::Error>(arm::Error::Credential(String::from("boom")))
            },
            "-",
        )
        .await;
        assert_eq!("-", value);
    }

    #[test]
    fn scaling_method_prefers_rules() {
        assert_eq!("Rules Based", scaling_method(true, true, 3));
        assert_eq!("Automatic", scaling_method(false, true, 3));
        assert_eq!("Manual (3 instance(s))", scaling_method(false, false, 3));
    }

    #[test]
    fn defender_tier_mapping() {
        assert_eq!("Enabled", defender_display(DefenderPlan::SqlServers, "Standard"));
        assert_eq!("Disabled", defender_display(DefenderPlan::SqlServers, "Free"));
        // reference quirk: Free counts as enabled for the compute plan
        assert_eq!("Enabled", defender_display(DefenderPlan::AppServices, "Free"));
        assert_eq!("Disabled", defender_display(DefenderPlan::StorageAccounts, ""));
    }

    #[tokio::test]
    async fn diagnostics_disabled_without_settings() {
        let transport = FakeTransport::default().with(
            "/res/providers/Microsoft.Insights/diagnosticSettings",
            json!({ "value": [] }),
        );
        let client = ArmClient::new(Arc::new(transport), "1111-2222");

        let summary = diagnostics_summary(&client, "/res").await.unwrap();
        assert_eq!(DiagnosticsSummary::disabled(), summary);
    }

    #[tokio::test]
    async fn diagnostics_destination_prefers_workspace() {
        let transport = FakeTransport::default().with(
            "/res/providers/Microsoft.Insights/diagnosticSettings",
            json!({
                "value": [{
                    "properties": {
                        "workspaceId": "/subscriptions/1/resourceGroups/rg/providers/Microsoft.OperationalInsights/workspaces/central-logs",
                        "storageAccountId": "/subscriptions/1/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/logsink",
                        "logs": [{ "enabled": true }, { "enabled": true }]
                    }
                }]
            }),
        );
        let client = ArmClient::new(Arc::new(transport), "1111-2222");

        let summary = diagnostics_summary(&client, "/res").await.unwrap();
        assert_eq!("Enable all logs", summary.state);
        assert_eq!("Log Analytics workspace central-logs", summary.destination);
    }

    #[tokio::test]
    async fn diagnostics_partial_logs_read_enabled() {
        let transport = FakeTransport::default().with(
            "/res/providers/Microsoft.Insights/diagnosticSettings",
            json!({
                "value": [{
                    "properties": {
                        "eventHubName": "diag-hub",
                        "logs": [{ "enabled": true }, { "enabled": false }]
                    }
                }]
            }),
        );
        let client = ArmClient::new(Arc::new(transport), "1111-2222");

        let summary = diagnostics_summary(&client, "/res").await.unwrap();
        assert_eq!("Enabled", summary.state);
        assert_eq!("Event hub diag-hub", summary.destination);
    }
}
