use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::arm::{self, ArmClient};

const FIREWALL_API: &str = "2021-11-01";
const RULE_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
const RULE_MAX_AGE_HOURS: i64 = 1;

pub const PUBLIC_IP_ENDPOINT: &str = "https://api.ipify.org";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Arm(#[from] arm::Error),

    #[error("Public IP lookup failed: {0}")]
    PublicIp(String),
}

#[derive(Debug, Deserialize)]
struct FirewallRule {
    name: String,
    #[serde(default)]
    properties: FirewallRuleProperties,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct FirewallRuleProperties {
    start_ip_address: Option<String>,
    end_ip_address: Option<String>,
}

/// Short-lived allowlist entry around a database access window. Opening the
/// session makes sure the caller's public IP is allowed through the server
/// firewall; closing it sweeps rules that have outlived their hour. Two
/// concurrent runs may race here; the pre-insert check for an identical IP
/// rule keeps the outcome idempotent without any locking.
pub struct FirewallSession<'a> {
    client: &'a ArmClient,
    resource_group: String,
    server: String,
    prefix: String,
}

impl<'a> FirewallSession<'a> {
    pub async fn open(
        client: &'a ArmClient,
        resource_group: &str,
        server: &str,
        prefix: &str,
    ) -> Result<FirewallSession<'a>, Error> {
        let ip = public_ip().await?;

        let session = FirewallSession {
            client,
            resource_group: resource_group.to_string(),
            server: server.to_string(),
            prefix: prefix.to_string(),
        };

        let rules = session.list_rules().await?;
        let already_allowed = rules.iter().any(|rule| {
            rule.properties.start_ip_address.as_deref() == Some(ip.as_str())
                && rule.properties.end_ip_address.as_deref() == Some(ip.as_str())
        });

        if already_allowed {
            info!(ip = %ip, server = %session.server, "existing firewall rule covers current address");
            return Ok(session);
        }

        let rule_name = format!(
            "{}-{}Z",
            session.prefix,
            Utc::now().format(RULE_TIMESTAMP_FORMAT)
        );
        let rule_path = format!("{}/{}", session.rules_path(), rule_name);
        session
            .client
            .put(
                &rule_path,
                FIREWALL_API,
                json!({
                    "properties": {
                        "startIpAddress": ip,
                        "endIpAddress": ip,
                    }
                }),
            )
            .await
            .map_err(Error::Arm)?;

        info!(rule = %rule_name, ip = %ip, server = %session.server, "firewall rule created");
        return Ok(session);
    }

    /// Best-effort sweep of expired allowlist entries. Never fails the run.
    pub async fn close(self) {
        let rules = match self.list_rules().await {
            Ok(rules) => rules,
            Err(error) => {
                warn!(server = %self.server, %error, "firewall rule sweep skipped");
                return;
            }
        };

        let now = Utc::now();
        for rule in rules {
            if !rule_expired(&rule.name, &self.prefix, now) {
                continue;
            }

            let rule_path = format!("{}/{}", self.rules_path(), rule.name);
            match self.client.delete(&rule_path, FIREWALL_API).await {
                Ok(_) => info!(rule = %rule.name, server = %self.server, "expired firewall rule removed"),
                Err(error) => {
                    warn!(rule = %rule.name, %error, "expired firewall rule removal failed")
                }
            }
        }
    }

    fn rules_path(&self) -> String {
        return self.client.resource_path(
            &self.resource_group,
            &format!("Microsoft.Sql/servers/{}/firewallRules", self.server),
        );
    }

    async fn list_rules(&self) -> Result<Vec<FirewallRule>, Error> {
        return self
            .client
            .list(&self.rules_path(), FIREWALL_API)
            .await
            .map_err(Error::Arm);
    }
}

/// Extracts the creation timestamp a generated rule name carries.
pub fn parse_rule_timestamp(name: &str, prefix: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix('Z')?;

    let parsed = NaiveDateTime::parse_from_str(stamp, RULE_TIMESTAMP_FORMAT).ok()?;
    return Some(parsed.and_utc());
}

/// Rules carrying the generated prefix expire one hour after creation.
/// Foreign rule names never expire through this sweep.
pub fn rule_expired(name: &str, prefix: &str, now: DateTime<Utc>) -> bool {
    return match parse_rule_timestamp(name, prefix) {
        Some(created) => now - created > Duration::hours(RULE_MAX_AGE_HOURS),
        None => false,
    };
}

pub async fn public_ip() -> Result<String, Error> {
    let response = reqwest::get(PUBLIC_IP_ENDPOINT)
        .await
        .map_err(|error| Error::PublicIp(error.to_string()))?;

    let ip = response
        .text()
        .await
        .map_err(|error| Error::PublicIp(error.to_string()))?;

    let ip = ip.trim().to_string();
    if ip.is_empty() {
        return Err(Error::PublicIp(String::from("empty response body")));
    }

    return Ok(ip);
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::parse_rule_timestamp;
    use super::rule_expired;

    const PREFIX: &str = "generated-access";

    #[test]
    fn parses_generated_rule_names() {
        let created = parse_rule_timestamp("generated-access-20260807T101500Z", PREFIX).unwrap();
        assert_eq!(Utc.with_ymd_and_hms(2026, 8, 7, 10, 15, 0).unwrap(), created);
    }

    #[test]
    fn foreign_rule_names_do_not_parse() {
        assert_eq!(None, parse_rule_timestamp("AllowAllWindowsAzureIps", PREFIX));
        assert_eq!(None, parse_rule_timestamp("generated-access-not-a-date", PREFIX));
        assert_eq!(
            None,
            parse_rule_timestamp("other-prefix-20260807T101500Z", PREFIX)
        );
    }

    #[test]
    fn rules_expire_after_one_hour() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();

        assert_eq!(
            true,
            rule_expired("generated-access-20260807T103000Z", PREFIX, now)
        );
        assert_eq!(
            false,
            rule_expired("generated-access-20260807T113000Z", PREFIX, now)
        );
        // foreign names are left alone
        assert_eq!(false, rule_expired("AllowAllWindowsAzureIps", PREFIX, now));
    }
}
