//! Command execution.

use crate::Commands;
use colored::Colorize;
use pgmeta_format::{
    format_segment_filename, parse_legacy_filename, ControlFileCheck, Lsn, WalPageHeader,
};
use pgmeta_inspect::{
    control_file_path, scan_segments, Config, ControlFileReader, WalSegmentValidator,
};
use serde::Serialize;
use std::path::Path;

/// Formatted command output, and whether the checked files passed.
pub struct Report {
    pub output: String,
    pub success: bool,
}

impl Report {
    fn ok(output: String) -> Self {
        Self {
            output,
            success: true,
        }
    }
}

#[derive(Serialize)]
struct ControlSummary<'a> {
    path: &'a Path,
    system_identifier: u64,
    pg_control_version: u32,
    check: ControlFileCheck,
}

#[derive(Serialize)]
struct SegmentSummary<'a> {
    path: &'a Path,
    complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<WalPageHeader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    defect: Option<String>,
}

/// Executes a command and returns the formatted output.
pub fn execute(
    config: &Config,
    cmd: Commands,
    json: bool,
) -> Result<Report, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Control { data_dir } => {
            let data_dir = data_dir
                .or_else(|| config.cluster.data_dir.clone())
                .ok_or("no data directory given and PGDATA is not set")?;
            let reader = ControlFileReader::new(config.control_layout()?);
            let path = control_file_path(&data_dir);
            let image = reader
                .read(&data_dir)
                .ok_or_else(|| format!("could not read control file \"{}\"", path.display()))?;
            let check = image.check();

            let output = if json {
                to_json(&ControlSummary {
                    path: &path,
                    system_identifier: image.system_identifier(),
                    pg_control_version: image.pg_control_version(),
                    check,
                })?
            } else {
                format!(
                    "pg_control version number:    {} (expected {})\n\
                     Database system identifier:   {}\n\
                     CRC:                          {:#010x} {}",
                    image.pg_control_version(),
                    check.expected_version,
                    image.system_identifier(),
                    check.stored_crc,
                    if check.crc_ok() {
                        "ok".green().to_string()
                    } else {
                        format!("(computed {:#010x})", check.computed_crc)
                            .red()
                            .to_string()
                    }
                )
            };
            Ok(Report {
                output,
                success: check.is_clean(),
            })
        }

        Commands::CheckSegment { path, size } => {
            let validator = WalSegmentValidator::new(config.wal_policy()?);
            let result = match size {
                Some(size) => validator.check(&path, size),
                None => validator.check_on_disk(&path),
            };
            let complete = result.is_ok();

            let output = if json {
                let (header, defect) = match &result {
                    Ok(header) => (Some(*header), None),
                    Err(defect) => (None, Some(defect.to_string())),
                };
                to_json(&SegmentSummary {
                    path: &path,
                    complete,
                    header,
                    defect,
                })?
            } else {
                match result {
                    Ok(header) => format!(
                        "{} {}\n{}",
                        "Complete".green(),
                        path.display().to_string().cyan(),
                        format_header(&header)
                    ),
                    Err(defect) => format!(
                        "{} {}: {}",
                        "Incomplete".red(),
                        path.display().to_string().cyan(),
                        defect
                    ),
                }
            };
            Ok(Report {
                output,
                success: complete,
            })
        }

        Commands::Scan { dir } => {
            let dir = dir
                .or_else(|| config.wal_dir())
                .ok_or("no WAL directory given and no data directory configured")?;
            let validator = WalSegmentValidator::new(config.wal_policy()?);
            let statuses = scan_segments(&dir, &validator)?;
            let success = statuses.iter().all(|s| s.is_complete());

            if json {
                return Ok(Report {
                    output: to_json(&statuses)?,
                    success,
                });
            }
            if statuses.is_empty() {
                return Ok(Report::ok(
                    format!("No WAL segments in {}", dir.display())
                        .yellow()
                        .to_string(),
                ));
            }

            let mut output = String::new();
            for status in &statuses {
                let verdict = match &status.defect {
                    None => "ok".green().to_string(),
                    Some(defect) => defect.to_string().red().to_string(),
                };
                output.push_str(&format!(
                    "{}  {:>10}  {}\n",
                    status.name.cyan(),
                    format_bytes(status.size),
                    verdict
                ));
            }
            let complete = statuses.iter().filter(|s| s.is_complete()).count();
            output.push_str(&format!(
                "{} of {} segments complete",
                complete,
                statuses.len()
            ));
            Ok(Report { output, success })
        }

        Commands::SegmentName { timeline, lsn } => {
            let name = format_segment_filename(timeline, lsn.0, config.wal.segment_size()?);
            if json {
                Ok(Report::ok(to_json(&serde_json::json!({
                    "timeline": timeline,
                    "lsn": lsn.to_string(),
                    "name": name,
                }))?))
            } else {
                Ok(Report::ok(name))
            }
        }

        Commands::ParseName { name } => {
            let parsed = parse_legacy_filename(&name, config.wal.segment_size()?)?;
            if json {
                Ok(Report::ok(to_json(&serde_json::json!({
                    "timeline": parsed.timeline,
                    "xlogid": parsed.xlogid,
                    "xrecoff": parsed.xrecoff,
                    "lsn": parsed.lsn().to_string(),
                }))?))
            } else {
                Ok(Report::ok(format!(
                    "Timeline:        {}\n\
                     Log id:          {:X}\n\
                     Segment start:   {}",
                    parsed.timeline,
                    parsed.xlogid,
                    parsed.lsn()
                )))
            }
        }

        Commands::ShowConfig => {
            let output = if json {
                to_json(config)?
            } else {
                serde_yaml::to_string(config)?
            };
            Ok(Report::ok(output.trim_end().to_string()))
        }
    }
}

/// Describes a page header for display.
fn format_header(header: &WalPageHeader) -> String {
    let common = header.common();
    let mut out = format!(
        "  magic {:#06X}, info {:#06X}, timeline {}, page address {}",
        common.magic,
        common.info,
        common.tli,
        Lsn(common.pageaddr)
    );
    if let WalPageHeader::Long {
        sysid,
        seg_size,
        xlog_blcksz,
        ..
    } = header
    {
        out.push_str(&format!(
            "\n  system identifier {}, segment size {}, block size {}",
            sysid,
            format_bytes(*seg_size as u64),
            xlog_blcksz
        ));
    }
    out
}

/// Formats bytes as human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn to_json(value: &impl Serialize) -> Result<String, Box<dyn std::error::Error>> {
    Ok(serde_json::to_string_pretty(value)?)
}
