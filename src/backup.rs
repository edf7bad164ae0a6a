//! Workspace bundles: a zip holding the school database plus a manifest and
//! a summary of what the database contains. Anything restored into a
//! workspace must open as SQLite and carry the school tables; the live
//! database is only replaced once the staged copy has been checked.
use anyhow::{anyhow, Context};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DB_FILE: &str = "school.sqlite3";
const STAGED_DB_FILE: &str = "school.sqlite3.importing";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/school.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
pub const BUNDLE_FORMAT: &str = "schoold-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";

const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const SCHOOL_TABLES: [&str; 6] = ["users", "students", "teachers", "marks", "grades", "attendance"];

/// Row counts of a school database, recorded in the bundle metadata and
/// reported after a restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceCounts {
    pub students: i64,
    pub teachers: i64,
    pub users: i64,
    pub attendance_records: i64,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub counts: WorkspaceCounts,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub counts: WorkspaceCounts,
}

enum InputKind {
    Bundle,
    RawSqlite,
    Unrecognized,
}

fn sniff_input(path: &Path) -> anyhow::Result<InputKind> {
    let f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut head = Vec::with_capacity(SQLITE_HEADER.len());
    f.take(SQLITE_HEADER.len() as u64)
        .read_to_end(&mut head)
        .context("failed to read file signature")?;
    if head.starts_with(&ZIP_SIGNATURE) {
        Ok(InputKind::Bundle)
    } else if head.as_slice() == SQLITE_HEADER {
        Ok(InputKind::RawSqlite)
    } else {
        Ok(InputKind::Unrecognized)
    }
}

/// Opens `path` read-only, checks every school table exists, and counts rows.
pub fn inspect_school_db(path: &Path) -> anyhow::Result<WorkspaceCounts> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open database {}", path.to_string_lossy()))?;
    for table in SCHOOL_TABLES {
        let present: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table],
                |r| r.get(0),
            )
            .with_context(|| format!("{} is not a readable database", path.to_string_lossy()))?;
        if present == 0 {
            return Err(anyhow!("not a school workspace database: missing table {}", table));
        }
    }
    let count = |table: &str| -> anyhow::Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .with_context(|| format!("failed to count {}", table))
    };
    Ok(WorkspaceCounts {
        students: count("students")?,
        teachers: count("teachers")?,
        users: count("users")?,
        attendance_records: count("attendance")?,
    })
}

fn write_json_entry(
    zip: &mut ZipWriter<File>,
    name: &str,
    value: &serde_json::Value,
    opts: FileOptions,
) -> anyhow::Result<()> {
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start {} entry", name))?;
    let text = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", name))?;
    zip.write_all(text.as_bytes())
        .with_context(|| format!("failed to write {} entry", name))?;
    Ok(())
}

/// Bundles the workspace database at `out_path`. The database is inspected
/// first so a bundle never carries something that could not be restored.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let counts = inspect_school_db(&db_path)?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
    });
    write_json_entry(&mut zip, MANIFEST_ENTRY, &manifest, opts)?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    let meta = json!({
        "sourceWorkspace": workspace_path.to_string_lossy(),
        "counts": counts,
    });
    write_json_entry(&mut zip, META_WORKSPACE_ENTRY, &meta, opts)?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: 3,
        counts,
    })
}

fn extract_bundle_db(in_path: &Path, staged: &Path) -> anyhow::Result<()> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut db_entry = archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {}", DB_ENTRY))?;
    let mut out = File::create(staged)
        .with_context(|| format!("failed to create {}", staged.to_string_lossy()))?;
    std::io::copy(&mut db_entry, &mut out).context("failed to extract database entry")?;
    out.flush().context("failed to flush extracted database")?;
    Ok(())
}

/// Restores the workspace database from a bundle or a raw SQLite file. The
/// input is staged next to the database and inspected; on any failure the
/// current database is left as it was. The caller must close its connection
/// first.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!("failed to create workspace {}", workspace_path.to_string_lossy())
    })?;
    let staged = workspace_path.join(STAGED_DB_FILE);
    if staged.exists() {
        let _ = std::fs::remove_file(&staged);
    }

    let format = match sniff_input(in_path)? {
        InputKind::Bundle => {
            extract_bundle_db(in_path, &staged)?;
            BUNDLE_FORMAT
        }
        InputKind::RawSqlite => {
            std::fs::copy(in_path, &staged).with_context(|| {
                format!("failed to stage sqlite file {}", in_path.to_string_lossy())
            })?;
            RAW_SQLITE_FORMAT
        }
        InputKind::Unrecognized => {
            return Err(anyhow!(
                "{} is neither a workspace bundle nor a SQLite database",
                in_path.to_string_lossy()
            ))
        }
    };

    let counts = match inspect_school_db(&staged) {
        Ok(c) => c,
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            return Err(e);
        }
    };

    let dst = workspace_path.join(DB_FILE);
    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!("failed to remove existing database {}", dst.to_string_lossy())
        })?;
    }
    std::fs::rename(&staged, &dst).with_context(|| {
        format!("failed to move restored database to {}", dst.to_string_lossy())
    })?;

    Ok(ImportSummary {
        bundle_format_detected: format.to_string(),
        counts,
    })
}
