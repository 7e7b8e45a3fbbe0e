//! Output formatting for audit results
//!
//! Records are written to a file as CSV, JSON or YAML, optionally echoed to
//! stdout as a table. Column order always follows the first record.

use anyhow::{bail, Context};
use colored::Colorize;
use netaudit_common::{ClusterRecord, UNKNOWN};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tabled::builder::Builder;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Csv,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "yaml" | "yml" => OutputFormat::Yaml,
            _ => OutputFormat::Csv,
        }
    }
}

/// How the output file is opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteMode {
    /// Fail if the file already exists
    CreateNew,
    /// Overwrite an existing file
    Clobber,
    Append,
}

impl WriteMode {
    pub fn from_flags(append: bool, clobber: bool) -> Self {
        if append {
            WriteMode::Append
        } else if clobber {
            WriteMode::Clobber
        } else {
            WriteMode::CreateNew
        }
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            WriteMode::CreateNew => options.write(true).create_new(true),
            WriteMode::Clobber => options.write(true).create(true).truncate(true),
            WriteMode::Append => options.append(true).create(true),
        };
        options
    }
}

/// Column names, taken from the first record
pub fn columns(records: &[ClusterRecord]) -> Vec<String> {
    records
        .first()
        .map(|r| r.keys().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Cells of `record` in column order; a missing column renders as `"?"`
fn row(record: &ClusterRecord, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| {
            record
                .get(c)
                .map(|cell| cell.to_string())
                .unwrap_or_else(|| UNKNOWN.to_string())
        })
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(fields: &[String]) -> String {
    let mut line = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

/// Render records as CSV with CRLF line endings
pub fn render_csv(records: &[ClusterRecord], headers: bool) -> String {
    let columns = columns(records);
    let mut out = String::new();
    if headers && !columns.is_empty() {
        out.push_str(&csv_line(&columns));
    }
    for record in records {
        out.push_str(&csv_line(&row(record, &columns)));
    }
    out
}

pub fn render(records: &[ClusterRecord], format: OutputFormat, headers: bool) -> anyhow::Result<String> {
    let rendered = match format {
        OutputFormat::Csv => render_csv(records, headers),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(records)?;
            json.push('\n');
            json
        }
        OutputFormat::Yaml => serde_yaml::to_string(records)?,
    };
    Ok(rendered)
}

/// JSON and YAML documents cannot be concatenated
fn check_mode(format: OutputFormat, mode: WriteMode) -> anyhow::Result<()> {
    if mode == WriteMode::Append && format != OutputFormat::Csv {
        bail!("--append only supports csv output, not {:?}", format);
    }
    Ok(())
}

/// Fail early, before any cluster is audited, if `path` cannot be written
pub fn check_destination(path: &Path, format: OutputFormat, mode: WriteMode) -> anyhow::Result<()> {
    check_mode(format, mode)?;
    if mode == WriteMode::CreateNew && path.exists() {
        bail!(
            "{} already exists (use --clobber to overwrite or --append to add rows)",
            path.display()
        );
    }
    Ok(())
}

/// Write records to `path` using the given format and open mode
///
/// Returns the number of records written. With no records the file is left
/// untouched.
pub fn write_records(
    path: &Path,
    records: &[ClusterRecord],
    format: OutputFormat,
    mode: WriteMode,
    headers: bool,
) -> anyhow::Result<usize> {
    check_mode(format, mode)?;
    if records.is_empty() {
        return Ok(0);
    }

    let contents = render(records, format, headers)?;
    let mut file = mode
        .open_options()
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(records.len())
}

/// Print records as a table using the tabled crate
pub fn print_table(records: &[ClusterRecord]) {
    if records.is_empty() {
        println!("{}", "No results found".yellow());
        return;
    }

    let columns = columns(records);
    let mut builder = Builder::default();
    builder.push_record(columns.clone());
    for record in records {
        builder.push_record(row(record, &columns));
    }
    println!("{}", builder.build());
}

/// Print a success message with green checkmark
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message.green());
}

/// Print an error message with red X
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print a warning message with yellow triangle
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
}

#[cfg(test)]
mod tests {
    use super::*;
    use netaudit_common::Cell;

    fn record(cid: &str, name: &str, nodes: Cell) -> ClusterRecord {
        [
            ("cid", Cell::from(cid)),
            ("name", Cell::from(name)),
            ("compute_nodes", nodes),
            ("mtu", Cell::Unknown),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("yml"), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_str("csv"), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_str("anything"), OutputFormat::Csv);
    }

    #[test]
    fn test_render_csv_with_headers() {
        let records = vec![
            record("a1", "prod", Cell::Int(5)),
            record("b2", "stage, east", Cell::from("2-6")),
        ];
        let csv = render_csv(&records, true);
        assert_eq!(
            csv,
            "cid,name,compute_nodes,mtu\r\na1,prod,5,?\r\nb2,\"stage, east\",2-6,?\r\n"
        );
    }

    #[test]
    fn test_render_csv_without_headers() {
        let records = vec![record("a1", "say \"hi\"", Cell::Int(1))];
        assert_eq!(render_csv(&records, false), "a1,\"say \"\"hi\"\"\",1,?\r\n");
    }

    #[test]
    fn test_render_csv_empty() {
        assert_eq!(render_csv(&[], true), "");
    }

    #[test]
    fn test_write_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let records = vec![record("a1", "prod", Cell::Int(5))];

        write_records(&path, &records, OutputFormat::Csv, WriteMode::CreateNew, true).unwrap();
        assert!(write_records(&path, &records, OutputFormat::Csv, WriteMode::CreateNew, true).is_err());

        write_records(&path, &records, OutputFormat::Csv, WriteMode::Append, false).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);

        write_records(&path, &records, OutputFormat::Csv, WriteMode::Clobber, true).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_empty_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let written = write_records(&path, &[], OutputFormat::Csv, WriteMode::Clobber, true).unwrap();

        assert_eq!(written, 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_check_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        check_destination(&path, OutputFormat::Csv, WriteMode::CreateNew).unwrap();

        std::fs::write(&path, "cid\r\n").unwrap();
        let err = check_destination(&path, OutputFormat::Csv, WriteMode::CreateNew).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        check_destination(&path, OutputFormat::Csv, WriteMode::Clobber).unwrap();
        check_destination(&path, OutputFormat::Csv, WriteMode::Append).unwrap();
    }

    #[test]
    fn test_append_rejected_for_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let records = vec![record("a1", "prod", Cell::Int(5))];

        for format in [OutputFormat::Json, OutputFormat::Yaml] {
            assert!(check_destination(&path, format, WriteMode::Append).is_err());
            assert!(write_records(&path, &records, format, WriteMode::Append, true).is_err());
        }
        assert!(!path.exists());

        write_records(&path, &records, OutputFormat::Json, WriteMode::Clobber, true).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_render_json_keeps_column_order() {
        let records = vec![record("a1", "prod", Cell::Int(5))];
        let json = render(&records, OutputFormat::Json, true).unwrap();
        let cid = json.find("\"cid\"").unwrap();
        let mtu = json.find("\"mtu\"").unwrap();
        assert!(cid < mtu);
        assert!(json.contains("\"mtu\": \"?\""));
    }
}
