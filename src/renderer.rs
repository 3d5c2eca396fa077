use std::fs;
use std::path::{Path, PathBuf};

use docx_rs::{
    AlignmentType, BreakType, Docx, Paragraph, Pic, Run, Style, StyleType, Table, TableCell,
    TableRow, VMergeType, WidthType,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::naming::{detect_environment, Environment};
use crate::spec::{self, SpecDocument, SpecRecord};

pub const DATA_FILE_SUFFIX: &str = "-data.json";

/// Prose sections occupy 1 (introduction) and 2 (overview); dynamic
/// specification sections start after them.
const FIRST_DYNAMIC_SECTION: u32 = 3;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Spec(#[from] spec::Error),

    #[error("Unable to read {0}: {1}")]
    ReadError(String, String),

    #[error("Unable to write {0}: {1}")]
    WriteError(String, String),
}

/// One configured entry of the manual loading mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDescriptor {
    pub filename: String,

    pub title: String,

    pub section_number: u32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    return true;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub title: String,
    pub section_number: u32,
    pub records: SpecDocument,
}

/// Manual mode: walk the configured list in order, skip disabled entries,
/// warn and skip entries whose backing file is missing.
pub fn load_manual(dir: &Path, sections: &[SectionDescriptor]) -> Result<Vec<LoadedDocument>, Error> {
    let mut documents = Vec::new();

    for descriptor in sections {
        if !descriptor.enabled {
            continue;
        }

        let path = dir.join(&descriptor.filename);
        if !path.is_file() {
            warn!(file = %path.display(), "specification data file missing, section skipped");
            continue;
        }

        documents.push(LoadedDocument {
            title: descriptor.title.clone(),
            section_number: descriptor.section_number,
            records: SpecDocument::load(&path)?,
        });
    }

    return Ok(documents);
}

/// Auto-discovery mode: every `*-data.json` file in the output directory, in
/// lexicographic order regardless of how the filesystem returns them.
pub fn discover(dir: &Path) -> Result<Vec<LoadedDocument>, Error> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir)
        .map_err(|error| Error::ReadError(dir.display().to_string(), error.to_string()))?;

    let mut filenames = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|error| Error::ReadError(dir.display().to_string(), error.to_string()))?;
        let filename = entry.file_name().to_string_lossy().to_string();
        if filename.ends_with(DATA_FILE_SUFFIX) {
            filenames.push(filename);
        }
    }
    filenames.sort();

    let mut documents = Vec::new();
    for (index, filename) in filenames.iter().enumerate() {
        let title = match title_from_filename(filename) {
            Some(title) => title,
            None => continue,
        };

        documents.push(LoadedDocument {
            title,
            section_number: FIRST_DYNAMIC_SECTION + index as u32,
            records: SpecDocument::load(&dir.join(filename))?,
        });
    }

    return Ok(documents);
}

/// `web-app-data.json` becomes `Web App Specification`.
pub fn title_from_filename(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(DATA_FILE_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }

    let titled: Vec<String> = stem
        .split('-')
        .filter(|token| !token.is_empty())
        .map(title_case)
        .collect();

    return Some(format!("{} Specification", titled.join(" ")));
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    return match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
}

/// Splits records into contiguous same-section groups. Grouping is strictly
/// by adjacency: a section name recurring later starts a fresh group, and no
/// re-sorting happens here.
pub fn group_records(records: &[SpecRecord]) -> Vec<Vec<&SpecRecord>> {
    let mut groups: Vec<Vec<&SpecRecord>> = Vec::new();

    for record in records {
        match groups.last_mut() {
            Some(group) if group[0].section == record.section => group.push(record),
            _ => groups.push(vec![record]),
        }
    }

    return groups;
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub output_path: PathBuf,
    pub title: String,
    pub client: Option<String>,
    pub architecture_image: Option<PathBuf>,
    pub base_name: String,
}

/// Renders the final document. An empty document set is a warning, not an
/// error, and produces no artifact.
pub fn render(
    settings: &RenderSettings,
    documents: &[LoadedDocument],
) -> Result<Option<PathBuf>, Error> {
    if documents.is_empty() {
        warn!("no specification documents loaded, nothing to render");
        return Ok(None);
    }

    let docx = build_docx(settings, documents);

    if let Some(parent) = settings.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::WriteError(parent.display().to_string(), error.to_string())
            })?;
        }
    }

    let file = fs::File::create(&settings.output_path).map_err(|error| {
        Error::WriteError(settings.output_path.display().to_string(), error.to_string())
    })?;
    docx.build().pack(file).map_err(|error| {
        Error::WriteError(settings.output_path.display().to_string(), error.to_string())
    })?;

    info!(file = %settings.output_path.display(), sections = documents.len(), "document rendered");
    return Ok(Some(settings.output_path.clone()));
}

const REQUIREMENTS: [(&str, &str); 4] = [
    (
        "Availability",
        "The application must be reachable during the agreed service hours; planned maintenance is announced in advance.",
    ),
    (
        "Data retention",
        "Relational database backups are kept according to the configured retention policies.",
    ),
    (
        "Transport security",
        "All public endpoints accept encrypted traffic only, with TLS 1.2 as the minimum protocol version.",
    ),
    (
        "Monitoring",
        "Resource diagnostics and alert rules ship their data to the central monitoring workspace.",
    ),
];

const GLOSSARY: [(&str, &str); 6] = [
    (
        "Resource group",
        "Logical container that groups related resources of one deployment.",
    ),
    (
        "SKU",
        "Stock keeping unit; the size and pricing tier a resource runs on.",
    ),
    (
        "DTU",
        "Database transaction unit, the blended performance measure of Azure SQL purchase tiers.",
    ),
    ("SLA", "Service level agreement."),
    ("TLS", "Transport layer security."),
    (
        "Redis",
        "In-memory data store used as the application cache.",
    ),
];

const REFERENCES: [(&str, &str); 5] = [
    (
        "Azure App Service documentation",
        "https://learn.microsoft.com/azure/app-service/",
    ),
    (
        "Azure SQL Database documentation",
        "https://learn.microsoft.com/azure/azure-sql/database/",
    ),
    (
        "Azure Cache for Redis documentation",
        "https://learn.microsoft.com/azure/azure-cache-for-redis/",
    ),
    (
        "Azure Storage documentation",
        "https://learn.microsoft.com/azure/storage/",
    ),
    (
        "Azure Monitor alerts",
        "https://learn.microsoft.com/azure/azure-monitor/alerts/",
    ),
];

fn purpose_sentence(environment: Environment) -> &'static str {
    return match environment {
        Environment::Test => {
            "This environment supports acceptance testing and verification of new releases before they are promoted to production."
        }
        Environment::Production => {
            "This environment hosts the live production workload serving end users."
        }
        Environment::Unknown => "This environment hosts the deployed workload.",
    };
}

fn heading1(text: &str) -> Paragraph {
    return Paragraph::new()
        .style("Heading1")
        .add_run(Run::new().add_text(text));
}

fn heading2(text: &str) -> Paragraph {
    return Paragraph::new()
        .style("Heading2")
        .add_run(Run::new().add_text(text));
}

fn body(text: &str) -> Paragraph {
    return Paragraph::new().add_run(Run::new().add_text(text));
}

fn page_break() -> Paragraph {
    return Paragraph::new().add_run(Run::new().add_break(BreakType::Page));
}

fn text_cell(text: &str, width: usize) -> TableCell {
    return TableCell::new()
        .width(width, WidthType::Dxa)
        .add_paragraph(body(text));
}

fn header_cell(text: &str, width: usize) -> TableCell {
    return TableCell::new()
        .width(width, WidthType::Dxa)
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text(text).bold()));
}

/// Specification table for one loaded document: contiguous same-section rows
/// share one vertically merged section cell.
fn specification_table(records: &[SpecRecord]) -> Table {
    let mut rows = vec![TableRow::new(vec![
        header_cell("Section", 2200),
        header_cell("Item", 3000),
        header_cell("Value", 4200),
    ])];

    for group in group_records(records) {
        for (offset, record) in group.iter().enumerate() {
            let section_cell = if offset == 0 {
                TableCell::new()
                    .width(2200, WidthType::Dxa)
                    .vertical_merge(VMergeType::Restart)
                    .add_paragraph(body(&record.section))
            } else {
                TableCell::new()
                    .width(2200, WidthType::Dxa)
                    .vertical_merge(VMergeType::Continue)
                    .add_paragraph(Paragraph::new())
            };

            rows.push(TableRow::new(vec![
                section_cell,
                text_cell(&record.title, 3000),
                text_cell(&record.value, 4200),
            ]));
        }
    }

    return Table::new(rows).set_grid(vec![2200, 3000, 4200]);
}

fn pair_table(header: (&str, &str), pairs: &[(&str, &str)]) -> Table {
    let mut rows = vec![TableRow::new(vec![
        header_cell(header.0, 2800),
        header_cell(header.1, 6600),
    ])];

    for (left, right) in pairs {
        rows.push(TableRow::new(vec![
            text_cell(left, 2800),
            text_cell(right, 6600),
        ]));
    }

    return Table::new(rows).set_grid(vec![2800, 6600]);
}

fn toc_entries(documents: &[LoadedDocument]) -> Vec<(String, String)> {
    let mut entries = vec![
        (String::from("1"), String::from("Introduction")),
        (String::from("2"), String::from("Overview")),
    ];

    let mut last_number = 2;
    for document in documents {
        entries.push((document.section_number.to_string(), document.title.clone()));
        last_number = last_number.max(document.section_number);
    }
    entries.push((
        (last_number + 1).to_string(),
        String::from("Client Specification"),
    ));

    return entries;
}

fn build_docx(settings: &RenderSettings, documents: &[LoadedDocument]) -> Docx {
    let environment = detect_environment(&settings.base_name);

    let mut docx = Docx::new()
        .add_style(
            Style::new("Title", StyleType::Paragraph)
                .name("Title")
                .size(56)
                .bold(),
        )
        .add_style(
            Style::new("Heading1", StyleType::Paragraph)
                .name("Heading 1")
                .size(32)
                .bold(),
        )
        .add_style(
            Style::new("Heading2", StyleType::Paragraph)
                .name("Heading 2")
                .size(26)
                .bold(),
        );

    // title page
    docx = docx
        .add_paragraph(
            Paragraph::new()
                .style("Title")
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text(&settings.title)),
        )
        .add_paragraph(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text(&settings.base_name)),
        );
    if let Some(client) = &settings.client {
        docx = docx.add_paragraph(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text(format!("Prepared for {}", client))),
        );
    }
    docx = docx.add_paragraph(page_break());

    // table of contents
    docx = docx.add_paragraph(heading1("Contents"));
    for (number, title) in toc_entries(documents) {
        docx = docx.add_paragraph(body(&format!("{}. {}", number, title)));
    }
    docx = docx.add_paragraph(page_break());

    // introduction
    docx = docx
        .add_paragraph(heading1("1. Introduction"))
        .add_paragraph(body(&format!(
            "This document describes the cloud resources provisioned for {}.",
            settings.base_name
        )))
        .add_paragraph(body(purpose_sentence(environment)))
        .add_paragraph(body(
            "All figures were collected from the platform management interface at generation time; manual edits will be overwritten by the next run.",
        ));

    // overview
    docx = docx
        .add_paragraph(heading1("2. Overview"))
        .add_paragraph(body(
            "The deployment consists of a web application with its hosting plan, a relational database, an in-memory cache, an object storage account and a set of alerting rules tying them together.",
        ));
    if let Some(image_path) = &settings.architecture_image {
        match fs::read(image_path) {
            Ok(bytes) => {
                docx = docx.add_paragraph(
                    Paragraph::new()
                        .align(AlignmentType::Center)
                        .add_run(Run::new().add_image(Pic::new(&bytes))),
                );
            }
            Err(error) => {
                warn!(file = %image_path.display(), %error, "architecture image unavailable, skipped");
            }
        }
    }

    // one section per loaded specification document
    for document in documents {
        docx = docx
            .add_paragraph(heading1(&format!(
                "{}. {}",
                document.section_number, document.title
            )))
            .add_table(specification_table(document.records.records()));
    }

    // trailing fixed sections
    let client_section = toc_entries(documents)
        .last()
        .map(|(number, _)| number.clone())
        .unwrap_or_default();
    docx = docx
        .add_paragraph(heading1(&format!("{}. Client Specification", client_section)))
        .add_table(pair_table(("Requirement", "Description"), &REQUIREMENTS))
        .add_paragraph(heading2("Glossary"))
        .add_table(pair_table(("Term", "Definition"), &GLOSSARY))
        .add_paragraph(heading2("References"))
        .add_table(pair_table(("Reference", "Link"), &REFERENCES));

    return docx;
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use tempfile::tempdir;

    use super::build_docx;
    use super::discover;
    use super::group_records;
    use super::load_manual;
    use super::render;
    use super::title_from_filename;
    use super::toc_entries;
    use super::LoadedDocument;
    use super::RenderSettings;
    use super::SectionDescriptor;
    use crate::spec::{SpecDocument, SpecRecord};

    fn record(section: &str, title: &str) -> SpecRecord {
        return SpecRecord::new(section, title, "value");
    }

    fn settings(dir: &std::path::Path) -> RenderSettings {
        return RenderSettings {
            output_path: dir.join("specification.docx"),
            title: String::from("Technical Specification"),
            client: Some(String::from("Orbia")),
            architecture_image: None,
            base_name: String::from("batchline-orbia-test"),
        };
    }

    #[test]
    fn grouping_splits_non_contiguous_sections() {
        let records = vec![
            record("A", "1"),
            record("A", "2"),
            record("B", "1"),
            record("A", "3"),
        ];

        let groups = group_records(&records);
        let shape: Vec<(String, usize)> = groups
            .iter()
            .map(|group| (group[0].section.clone(), group.len()))
            .collect();

        assert_eq!(
            vec![
                (String::from("A"), 2),
                (String::from("B"), 1),
                (String::from("A"), 1)
            ],
            shape
        );
    }

    #[test]
    fn titles_derive_from_filenames() {
        assert_eq!(
            Some(String::from("Web App Specification")),
            title_from_filename("web-app-data.json")
        );
        assert_eq!(
            Some(String::from("A Specification")),
            title_from_filename("a-data.json")
        );
        assert_eq!(None, title_from_filename("notes.txt"));
        assert_eq!(None, title_from_filename("-data.json"));
    }

    #[test]
    fn discovery_sorts_lexicographically() {
        let dir = tempdir().unwrap();
        let records = SpecDocument::new(vec![record("General", "Item")]);

        // write in reverse order on purpose
        records.write(&dir.path().join("b-data.json")).unwrap();
        records.write(&dir.path().join("a-data.json")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let documents = discover(dir.path()).unwrap();
        let titles: Vec<&str> = documents.iter().map(|d| d.title.as_str()).collect();

        assert_eq!(vec!["A Specification", "B Specification"], titles);
        assert_eq!(3, documents[0].section_number);
        assert_eq!(4, documents[1].section_number);
    }

    #[test]
    fn discovery_of_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let documents = discover(&dir.path().join("missing")).unwrap();
        assert_eq!(true, documents.is_empty());
    }

    #[test]
    fn manual_mode_skips_disabled_and_missing_entries() {
        let dir = tempdir().unwrap();
        let records = SpecDocument::new(vec![record("General", "Item")]);
        records.write(&dir.path().join("cache-data.json")).unwrap();
        records.write(&dir.path().join("storage-data.json")).unwrap();

        let sections = vec![
            SectionDescriptor {
                filename: String::from("cache-data.json"),
                title: String::from("Cache Specification"),
                section_number: 3,
                enabled: true,
            },
            SectionDescriptor {
                filename: String::from("storage-data.json"),
                title: String::from("Storage Specification"),
                section_number: 4,
                enabled: false,
            },
            SectionDescriptor {
                filename: String::from("database-data.json"),
                title: String::from("Database Specification"),
                section_number: 5,
                enabled: true,
            },
        ];

        let documents = load_manual(dir.path(), &sections).unwrap();
        let titles: Vec<&str> = documents.iter().map(|d| d.title.as_str()).collect();

        assert_eq!(vec!["Cache Specification"], titles);
    }

    #[test]
    fn toc_appends_trailing_client_entry() {
        let documents = vec![LoadedDocument {
            title: String::from("Cache Specification"),
            section_number: 3,
            records: SpecDocument::new(vec![record("General", "Item")]),
        }];

        let entries = toc_entries(&documents);
        assert_eq!(4, entries.len());
        assert_eq!(
            (String::from("4"), String::from("Client Specification")),
            entries[3]
        );
    }

    #[test]
    fn empty_document_set_renders_nothing() {
        let dir = tempdir().unwrap();
        let result = render(&settings(dir.path()), &[]).unwrap();

        assert_eq!(None, result);
        assert_eq!(false, dir.path().join("specification.docx").exists());
    }

    #[test]
    fn renders_document_artifact() {
        let dir = tempdir().unwrap();
        let documents = vec![LoadedDocument {
            title: String::from("Cache Specification"),
            section_number: 3,
            records: SpecDocument::new(vec![
                record("General", "Location"),
                record("General", "Version"),
                record("Security", "Non-SSL port"),
                record("General", "Extra"),
            ]),
        }];

        let path = render(&settings(dir.path()), &documents).unwrap().unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(false, bytes.is_empty());
    }

    #[test]
    fn docx_build_packs_into_buffer() {
        let dir = tempdir().unwrap();
        let documents = vec![LoadedDocument {
            title: String::from("Storage Specification"),
            section_number: 3,
            records: SpecDocument::new(vec![record("Replication", "SKU")]),
        }];

        let docx = build_docx(&settings(dir.path()), &documents);
        let mut buffer = Cursor::new(Vec::new());
        docx.build().pack(&mut buffer).unwrap();

        assert_eq!(false, buffer.into_inner().is_empty());
    }
}
