use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use crate::arm::ResourceId;
use crate::fetchers::{
    defender_state, diagnostics_summary, enabled_disabled, has_autoscale_rules, optional, primary,
    scaling_method, DefenderPlan, DiagnosticsSummary, Error, FetchContext,
};
use crate::naming::ResourceKind;
use crate::spec::{SpecDocument, SpecRecord};

const APP_SERVICE_API: &str = "2023-12-01";

#[derive(Debug, Deserialize)]
struct Plan {
    id: String,
    location: String,
    kind: Option<String>,
    sku: PlanSku,
    #[serde(default)]
    properties: PlanProperties,
}

#[derive(Debug, Deserialize)]
struct PlanSku {
    name: Option<String>,
    tier: Option<String>,
    #[serde(default)]
    capacity: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PlanProperties {
    elastic_scale_enabled: Option<bool>,
    reserved: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Site {
    id: String,
    #[serde(default)]
    properties: SiteProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SiteProperties {
    state: Option<String>,
    default_host_name: Option<String>,
    https_only: Option<bool>,
    client_affinity_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SiteConfig {
    #[serde(default)]
    properties: SiteConfigProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SiteConfigProperties {
    min_tls_version: Option<String>,
    ftps_state: Option<String>,
    always_on: Option<bool>,
}

fn operating_system(kind: &Option<String>, reserved: Option<bool>) -> &'static str {
    let linux_kind = kind
        .as_deref()
        .map(|k| k.to_lowercase().contains("linux"))
        .unwrap_or(false);
    if linux_kind || reserved.unwrap_or(false) {
        return "Linux";
    }
    return "Windows";
}

fn plan_sku_label(sku: &PlanSku) -> String {
    return match (&sku.tier, &sku.name) {
        (Some(tier), Some(name)) => format!("{} ({})", tier, name),
        (Some(tier), None) => tier.clone(),
        (None, Some(name)) => name.clone(),
        (None, None) => String::from("-"),
    };
}

pub async fn fetch(ctx: &FetchContext<'_>) -> Result<PathBuf, Error> {
    let resource_group = ctx.groups.for_kind(ResourceKind::WebApp);
    let plan_name = &ctx.names.app_service_plan;
    let site_name = &ctx.names.web_app;

    let plan_path = ctx.client.resource_path(
        resource_group,
        &format!("Microsoft.Web/serverfarms/{}", plan_name),
    );
    let site_path = ctx
        .client
        .resource_path(resource_group, &format!("Microsoft.Web/sites/{}", site_name));

    let plan: Plan = primary(plan_name, ctx.client.get(&plan_path, APP_SERVICE_API).await)?;
    let site: Site = primary(site_name, ctx.client.get(&site_path, APP_SERVICE_API).await)?;

    let site_config = optional(
        site_name,
        "site configuration",
        ctx.client
            .get::<SiteConfig>(&format!("{}/config/web", site_path), APP_SERVICE_API),
        SiteConfig::default(),
    )
    .await;

    let plan_id = ResourceId::parse(&plan.id).unwrap_or_else(|_| {
        // the service returned this id; fall back to the requested path
        ResourceId::parse(&plan_path).expect("constructed path is well formed")
    });
    let rules_based = optional(
        plan_name,
        "autoscale settings",
        has_autoscale_rules(ctx.client, resource_group, &plan_id),
        false,
    )
    .await;
    let scaling = scaling_method(
        rules_based,
        plan.properties.elastic_scale_enabled.unwrap_or(false),
        plan.sku.capacity.unwrap_or(1),
    );

    let diagnostics = optional(
        site_name,
        "diagnostic settings",
        diagnostics_summary(ctx.client, &site.id),
        DiagnosticsSummary::disabled(),
    )
    .await;

    let defender = defender_state(ctx.client, site_name, DefenderPlan::AppServices).await;

    let display = |value: &Option<String>| -> String {
        return value.clone().unwrap_or_else(|| String::from("-"));
    };

    let records = vec![
        SpecRecord::new("General", "Resource group", resource_group),
        SpecRecord::new("General", "Location", plan.location.as_str()),
        SpecRecord::new(
            "General",
            "Operating system",
            operating_system(&plan.kind, plan.properties.reserved),
        ),
        SpecRecord::new("General", "State", display(&site.properties.state)),
        SpecRecord::new(
            "General",
            "Default hostname",
            display(&site.properties.default_host_name),
        ),
        SpecRecord::new("App Service Plan", "Plan name", plan_name.as_str()),
        SpecRecord::new("App Service Plan", "Pricing tier", plan_sku_label(&plan.sku)),
        SpecRecord::new(
            "App Service Plan",
            "Instance count",
            plan.sku.capacity.unwrap_or(1).to_string(),
        ),
        SpecRecord::new("App Service Plan", "Scaling method", scaling),
        SpecRecord::new(
            "Security",
            "HTTPS only",
            enabled_disabled(site.properties.https_only.unwrap_or(false)),
        ),
        SpecRecord::new(
            "Security",
            "Minimum TLS version",
            display(&site_config.properties.min_tls_version),
        ),
        SpecRecord::new(
            "Security",
            "FTPS state",
            display(&site_config.properties.ftps_state),
        ),
        SpecRecord::new("Security", "Defender for App Service", defender),
        SpecRecord::new(
            "Configuration",
            "Always on",
            enabled_disabled(site_config.properties.always_on.unwrap_or(false)),
        ),
        SpecRecord::new(
            "Configuration",
            "Client affinity",
            enabled_disabled(site.properties.client_affinity_enabled.unwrap_or(false)),
        ),
        SpecRecord::new("Monitoring", "Diagnostic settings", diagnostics.state.as_str()),
        SpecRecord::new("Monitoring", "Diagnostic destination", diagnostics.destination.as_str()),
    ];

    let path = ctx.output_dir.join(ResourceKind::WebApp.data_file());
    SpecDocument::new(records).write(&path)?;
    info!(resource = %site_name, file = %path.display(), "web app specification written");

    return Ok(path);
}
