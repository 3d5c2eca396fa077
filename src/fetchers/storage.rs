use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use crate::fetchers::{
    defender_state, diagnostics_summary, enabled_disabled, optional, primary, DefenderPlan,
    DiagnosticsSummary, Error, FetchContext,
};
use crate::naming::ResourceKind;
use crate::spec::{SpecDocument, SpecRecord};

const STORAGE_API: &str = "2023-01-01";

#[derive(Debug, Deserialize)]
struct StorageAccount {
    id: String,
    location: String,
    kind: Option<String>,
    sku: Option<StorageSku>,
    #[serde(default)]
    properties: StorageProperties,
}

#[derive(Debug, Deserialize)]
struct StorageSku {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StorageProperties {
    access_tier: Option<String>,
    supports_https_traffic_only: Option<bool>,
    minimum_tls_version: Option<String>,
    allow_blob_public_access: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Container {
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replication {
    pub copies: String,
    pub locations: String,
}

/// Replication semantics per storage SKU. The switch is exhaustive over the
/// documented SKU identifiers; anything else reads as `-`.
pub fn replication(sku: &str) -> Replication {
    let known: Option<(&str, &str)> = match sku {
        "Standard_LRS" | "Premium_LRS" => {
            Some(("3 copies", "Single region (one datacenter)"))
        }
        "Standard_ZRS" | "Premium_ZRS" => {
            Some(("3 copies", "Availability zones within the primary region"))
        }
        "Standard_GRS" => Some(("6 copies", "Primary region plus geo-replicated secondary region")),
        "Standard_RAGRS" => Some(("6 copies", "Primary region plus readable secondary region")),
        "Standard_GZRS" => Some((
            "6 copies",
            "Availability zones plus geo-replicated secondary region",
        )),
        "Standard_RAGZRS" => Some(("6 copies", "Availability zones plus readable secondary region")),
        _ => None,
    };

    return match known {
        Some((copies, locations)) => Replication {
            copies: copies.to_string(),
            locations: locations.to_string(),
        },
        None => Replication {
            copies: String::from("-"),
            locations: String::from("-"),
        },
    };
}

/// Read-access SLA per (SKU, access tier). Absent access tiers count as Hot,
/// unknown SKUs read as `-`.
pub fn read_access_sla(sku: &str, access_tier: Option<&str>) -> String {
    let cool = matches!(access_tier, Some(tier) if tier.eq_ignore_ascii_case("cool"));

    let sla = match sku {
        "Standard_RAGRS" | "Standard_RAGZRS" => {
            if cool {
                Some("99.9%")
            } else {
                Some("99.99%")
            }
        }
        "Standard_LRS" | "Standard_ZRS" | "Standard_GRS" | "Standard_GZRS" | "Premium_LRS"
        | "Premium_ZRS" => {
            if cool {
                Some("99%")
            } else {
                Some("99.9%")
            }
        }
        _ => None,
    };

    return match sla {
        Some(value) => value.to_string(),
        None => String::from("-"),
    };
}

fn containers_label(containers: &[Container]) -> String {
    if containers.is_empty() {
        return String::from("-");
    }
    let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
    return names.join(", ");
}

pub async fn fetch(ctx: &FetchContext<'_>) -> Result<PathBuf, Error> {
    let resource_group = ctx.groups.for_kind(ResourceKind::Storage);
    let account_name = &ctx.names.storage_account;

    let account_path = ctx.client.resource_path(
        resource_group,
        &format!("Microsoft.Storage/storageAccounts/{}", account_name),
    );

    let account: StorageAccount =
        primary(account_name, ctx.client.get(&account_path, STORAGE_API).await)?;

    let sku_name = account
        .sku
        .as_ref()
        .map(|sku| sku.name.clone())
        .unwrap_or_default();
    let replication = replication(&sku_name);
    let sla = read_access_sla(&sku_name, account.properties.access_tier.as_deref());

    let containers = optional(
        account_name,
        "container listing",
        ctx.client.list::<Container>(
            &format!("{}/blobServices/default/containers", account_path),
            STORAGE_API,
        ),
        Vec::new(),
    )
    .await;

    let diagnostics = optional(
        account_name,
        "diagnostic settings",
        diagnostics_summary(ctx.client, &account.id),
        DiagnosticsSummary::disabled(),
    )
    .await;

    let defender = defender_state(ctx.client, account_name, DefenderPlan::StorageAccounts).await;

    let display = |value: &Option<String>| -> String {
        return value.clone().unwrap_or_else(|| String::from("-"));
    };

    let records = vec![
        SpecRecord::new("General", "Resource group", resource_group),
        SpecRecord::new("General", "Location", account.location.as_str()),
        SpecRecord::new(
            "General",
            "Kind",
            account.kind.as_deref().unwrap_or("-"),
        ),
        SpecRecord::new(
            "General",
            "Access tier",
            display(&account.properties.access_tier),
        ),
        SpecRecord::new(
            "Replication",
            "SKU",
            if sku_name.is_empty() { "-" } else { sku_name.as_str() },
        ),
        SpecRecord::new("Replication", "Copies", replication.copies.as_str()),
        SpecRecord::new("Replication", "Locations", replication.locations.as_str()),
        SpecRecord::new("Replication", "Read access SLA", sla),
        SpecRecord::new(
            "Security",
            "HTTPS-only traffic",
            enabled_disabled(account.properties.supports_https_traffic_only.unwrap_or(false)),
        ),
        SpecRecord::new(
            "Security",
            "Minimum TLS version",
            display(&account.properties.minimum_tls_version),
        ),
        SpecRecord::new(
            "Security",
            "Blob public access",
            enabled_disabled(account.properties.allow_blob_public_access.unwrap_or(false)),
        ),
        SpecRecord::new("Security", "Defender for Storage", defender),
        SpecRecord::new("Blob storage", "Containers", containers_label(&containers)),
        SpecRecord::new("Monitoring", "Diagnostic settings", diagnostics.state.as_str()),
        SpecRecord::new("Monitoring", "Diagnostic destination", diagnostics.destination.as_str()),
    ];

    let path = ctx.output_dir.join(ResourceKind::Storage.data_file());
    SpecDocument::new(records).write(&path)?;
    info!(resource = %account_name, file = %path.display(), "storage specification written");

    return Ok(path);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::tempdir;

    use super::fetch;
    use super::read_access_sla;
    use super::replication;
    use crate::arm::ArmClient;
    use crate::config::{DatabaseConfig, NameOverrides, ResourceGroupOverrides};
    use crate::fetchers::testing::FakeTransport;
    use crate::fetchers::FetchContext;
    use crate::naming::{ResourceGroups, ResourceNames};
    use crate::spec::SpecDocument;

    const BASE: &str = "batchline-orbia-test";

    #[test]
    fn replication_table_known_skus() {
        let lrs = replication("Standard_LRS");
        assert_eq!("3 copies", lrs.copies);
        assert_eq!("Single region (one datacenter)", lrs.locations);

        let ragrs = replication("Standard_RAGRS");
        assert_eq!("6 copies", ragrs.copies);
        assert_eq!("Primary region plus readable secondary region", ragrs.locations);

        let gzrs = replication("Standard_GZRS");
        assert_eq!(
            "Availability zones plus geo-replicated secondary region",
            gzrs.locations
        );
    }

    #[test]
    fn replication_unknown_sku_falls_back() {
        let unknown = replication("Mystery_XRS");
        assert_eq!("-", unknown.copies);
        assert_eq!("-", unknown.locations);
    }

    #[test]
    fn sla_decision_table() {
        assert_eq!("99.99%", read_access_sla("Standard_RAGRS", Some("Hot")));
        assert_eq!("99.9%", read_access_sla("Standard_RAGRS", Some("Cool")));
        assert_eq!("99.9%", read_access_sla("Standard_LRS", Some("Hot")));
        assert_eq!("99%", read_access_sla("Standard_LRS", Some("Cool")));
        // missing tier counts as Hot
        assert_eq!("99.9%", read_access_sla("Standard_GRS", None));
        assert_eq!("-", read_access_sla("Mystery_XRS", Some("Hot")));
    }

    #[tokio::test]
    async fn fetch_writes_storage_document() {
        let dir = tempdir().unwrap();
        let account_path = format!(
            "/subscriptions/1111-2222/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/batchlineorbiatest",
            BASE
        );
        let transport = FakeTransport::default()
            .with(
                &account_path,
                json!({
                    "id": account_path,
                    "location": "westeurope",
                    "kind": "StorageV2",
                    "sku": { "name": "Standard_RAGRS" },
                    "properties": {
                        "accessTier": "Hot",
                        "supportsHttpsTrafficOnly": true,
                        "minimumTlsVersion": "TLS1_2",
                        "allowBlobPublicAccess": false
                    }
                }),
            )
            .with(
                &format!("{}/blobServices/default/containers", account_path),
                json!({ "value": [{ "name": "exports" }, { "name": "backups" }] }),
            );
        let client = ArmClient::new(Arc::new(transport), "1111-2222");
        let names = ResourceNames::resolve(BASE, &NameOverrides::default());
        let groups = ResourceGroups::resolve(BASE, &None, &ResourceGroupOverrides::default());
        let database = DatabaseConfig::default();
        let ctx = FetchContext {
            client: &client,
            names: &names,
            groups: &groups,
            output_dir: dir.path(),
            database: &database,
        };

        let path = fetch(&ctx).await.unwrap();
        let document = SpecDocument::load(&path).unwrap();
        let records = document.records();

        let value_of = |title: &str| -> &str {
            return &records.iter().find(|r| r.title == title).unwrap().value;
        };

        assert_eq!("Standard_RAGRS", value_of("SKU"));
        assert_eq!("6 copies", value_of("Copies"));
        assert_eq!("99.99%", value_of("Read access SLA"));
        assert_eq!("exports, backups", value_of("Containers"));
        assert_eq!("Enabled", value_of("HTTPS-only traffic"));
        assert_eq!("Disabled", value_of("Blob public access"));
    }
}
