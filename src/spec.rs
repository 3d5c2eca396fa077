use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error in {0}: {1}")]
    ParsingError(String, String),

    #[error("Unable to write {0}: {1}")]
    WriteError(String, String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

/// One display row of a specification document. `value` is always a
/// pre-formatted display string, never a raw number or boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecRecord {
    pub section: String,
    pub title: String,
    pub value: String,
}

impl SpecRecord {
    pub fn new(
        section: impl Into<String>,
        title: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        return Self {
            section: section.into(),
            title: title.into(),
            value: value.into(),
        };
    }
}

/// Ordered record set for one resource. Record order drives table row order
/// in the rendered document, so it is part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecDocument(pub Vec<SpecRecord>);

impl SpecDocument {
    pub fn new(records: Vec<SpecRecord>) -> Self {
        return Self(records);
    }

    pub fn records(&self) -> &[SpecRecord] {
        return &self.0;
    }

    pub fn is_empty(&self) -> bool {
        return self.0.is_empty();
    }

    /// Writes the document as pretty-printed JSON. The write goes through a
    /// staging file and a rename so a failure never leaves a partial file
    /// behind and an existing file is replaced wholesale.
    pub fn write(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|error| {
                    Error::WriteError(parent.display().to_string(), error.to_string())
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(&self.0)
            .map_err(|error| Error::WriteError(path.display().to_string(), error.to_string()))?;

        let staged = path.with_extension("json.tmp");
        fs::write(&staged, contents)
            .map_err(|error| Error::WriteError(staged.display().to_string(), error.to_string()))?;
        fs::rename(&staged, path)
            .map_err(|error| Error::WriteError(path.display().to_string(), error.to_string()))?;

        return Ok(());
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = match fs::read_to_string(path) {
            Ok(raw_contents) => Ok(raw_contents),
            Err(error) => match error.kind() {
                io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
                _ => Err(Error::Unknown(error.to_string())),
            },
        }?;

        let records: Vec<SpecRecord> = serde_json::from_str(&contents)
            .map_err(|error| Error::ParsingError(path.display().to_string(), error.to_string()))?;

        return Ok(Self(records));
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::Error;
    use super::SpecDocument;
    use super::SpecRecord;
    use tempfile::tempdir;

    fn sample_document() -> SpecDocument {
        return SpecDocument::new(vec![
            SpecRecord::new("General", "Resource group", "batchline-orbia-test"),
            SpecRecord::new("General", "Location", "westeurope"),
            SpecRecord::new("Security", "HTTPS only", "Enabled"),
        ]);
    }

    #[test]
    fn round_trip_preserves_record_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("web-app-data.json");

        let document = sample_document();
        document.write(&path).unwrap();

        let loaded = SpecDocument::load(&path).unwrap();
        assert_eq!(document, loaded);
    }

    #[test]
    fn writing_twice_is_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache-data.json");

        let document = sample_document();
        document.write(&path).unwrap();
        let first = fs::read(&path).unwrap();

        document.write(&path).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn write_replaces_previous_record_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage-data.json");

        sample_document().write(&path).unwrap();

        let replacement =
            SpecDocument::new(vec![SpecRecord::new("General", "Kind", "StorageV2")]);
        replacement.write(&path).unwrap();

        let loaded = SpecDocument::load(&path).unwrap();
        assert_eq!(replacement, loaded);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("database-data.json");

        let result = SpecDocument::load(&path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::FileNotFound(_) => {}
            _ => panic!("Expected `FileNotFound` error"),
        }
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alert-data.json");
        fs::write(&path, "not json").unwrap();

        let result = SpecDocument::load(&path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ParsingError(_, _) => {}
            _ => panic!("Expected `ParsingError` error"),
        }
    }

}
