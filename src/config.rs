use serde::{Deserialize, Serialize};
use std::{env, fs, io, path::PathBuf};
use validator::{Validate, ValidationError};

use crate::naming;
use crate::renderer::SectionDescriptor;

pub const SUBSCRIPTION_ENV_VAR: &str = "AZURE_SUBSCRIPTION_ID";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Missing configuration value: {0}")]
    MissingValue(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct NameOverrides {
    pub resource_group: Option<String>,

    pub web_app: Option<String>,

    pub app_service_plan: Option<String>,

    pub sql_server: Option<String>,

    pub sql_database: Option<String>,

    pub cache: Option<String>,

    #[validate(custom = "validate_storage_account_name")]
    pub storage_account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourceGroupOverrides {
    pub web_app: Option<String>,

    pub database: Option<String>,

    pub cache: Option<String>,

    pub storage: Option<String>,

    pub alerts: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_document_path")]
    pub output_path: PathBuf,

    pub architecture_image: Option<PathBuf>,

    #[serde(default = "default_document_title")]
    pub title: String,

    pub client: Option<String>,

    #[serde(default)]
    pub auto_discover: bool,

    #[serde(default)]
    pub sections: Vec<SectionDescriptor>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        return Self {
            output_path: default_document_path(),
            architecture_image: None,
            title: default_document_title(),
            client: None,
            auto_discover: false,
            sections: Vec::new(),
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub ensure_firewall_access: bool,

    #[serde(default = "default_firewall_rule_prefix")]
    pub firewall_rule_prefix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        return Self {
            ensure_firewall_access: false,
            firewall_rule_prefix: default_firewall_rule_prefix(),
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    #[validate(required)]
    pub subscription_id: Option<String>,

    pub base_name: Option<String>,

    pub product: Option<String>,

    pub site: Option<String>,

    pub environment: Option<String>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    #[validate]
    pub names: NameOverrides,

    #[serde(default)]
    pub resource_groups: ResourceGroupOverrides,

    #[serde(default)]
    pub document: DocumentConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl RunConfig {
    /// The validated subscription id. `parse` guarantees presence.
    pub fn subscription(&self) -> &str {
        return self.subscription_id.as_deref().unwrap_or_default();
    }

    /// The base resource name: either supplied directly or derived from the
    /// sanitized product/site/environment identifiers.
    pub fn resolved_base_name(&self) -> Result<String, Error> {
        if let Some(base) = &self.base_name {
            return Ok(base.clone());
        }

        match (&self.product, &self.site, &self.environment) {
            (Some(product), Some(site), Some(environment)) => {
                return Ok(naming::base_name(product, site, environment));
            }
            _ => {
                return Err(Error::MissingValue(String::from(
                    "either base_name or all of product/site/environment",
                )));
            }
        }
    }

    pub fn redacted_subscription(&self) -> String {
        let subscription = self.subscription();
        let visible = subscription.len().min(4);
        return format!("****{}", &subscription[subscription.len() - visible..]);
    }
}

pub fn parse(path: &PathBuf) -> Result<RunConfig, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    let mut config: RunConfig = match serde_yaml::from_str(&contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    if config.subscription_id.is_none() {
        config.subscription_id = env::var(SUBSCRIPTION_ENV_VAR).ok().filter(|v| !v.is_empty());
    }

    match config.validate() {
        Ok(_) => (),
        Err(error) => return Err(Error::ValidationError(error.to_string())),
    }

    // fail early instead of inside the fetch stage
    config.resolved_base_name()?;

    return Ok(config);
}

fn validate_storage_account_name(name: &str) -> Result<(), ValidationError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !valid_chars || name.len() < 3 || name.len() > 24 {
        return Err(ValidationError::new(
            "Storage account names are 3-24 lowercase letters and digits",
        ));
    }

    return Ok(());
}

fn default_output_dir() -> PathBuf {
    return PathBuf::from("output");
}

fn default_document_path() -> PathBuf {
    return PathBuf::from("output/specification.docx");
}

fn default_document_title() -> String {
    return String::from("Technical Specification");
}

fn default_firewall_rule_prefix() -> String {
    return String::from("generated-access");
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;

    use super::parse;
    use super::Error;
    use super::RunConfig;
    use tempfile::tempdir;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{}", contents).unwrap();

        return (dir, file_path);
    }

    #[test]
    fn file_does_not_exist() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::FileNotFound(_) => {}
            _ => panic!("Expected `FileNotFound` error"),
        }
    }

    #[test]
    fn file_wrong_format() {
        let (_dir, file_path) = write_config("[not yaml");

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ParsingError(_) => {}
            _ => panic!("Expected `ParsingError` error"),
        }
    }

    #[test]
    fn rejects_invalid_storage_account_override() {
        let (_dir, file_path) = write_config(
            "subscription_id: 1111-2222\nbase_name: batchline-orbia-test\nnames:\n  storage_account: Has-Hyphens",
        );

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn requires_base_name_or_identifiers() {
        let (_dir, file_path) = write_config("subscription_id: 1111-2222\nproduct: batchline");

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::MissingValue(_) => {}
            _ => panic!("Expected `MissingValue` error"),
        }
    }

    #[test]
    fn parses_the_config() {
        let (_dir, file_path) = write_config(
            "subscription_id: 1111-2222\nproduct: Batchline\nsite: Orbia\nenvironment: test",
        );

        let result = parse(&file_path);
        assert_eq!(false, result.is_err());

        let config = result.unwrap();
        assert_eq!("1111-2222", config.subscription());
        assert_eq!("batchline-orbia-test", config.resolved_base_name().unwrap());
        assert_eq!(PathBuf::from("output"), config.output_dir);
    }

    #[test]
    fn redacts_all_but_subscription_tail() {
        let config = RunConfig {
            subscription_id: Some(String::from("00000000-aaaa-bbbb-cccc-123412341234")),
            base_name: Some(String::from("batchline-orbia-test")),
            product: None,
            site: None,
            environment: None,
            output_dir: super::default_output_dir(),
            names: super::NameOverrides::default(),
            resource_groups: super::ResourceGroupOverrides::default(),
            document: super::DocumentConfig::default(),
            database: super::DatabaseConfig::default(),
        };

        assert_eq!("****1234", config.redacted_subscription());
    }
}
