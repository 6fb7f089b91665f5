use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use camstream_frame::{Frame, SessionReport};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Payload bytes only, back to back (pipe into an MJPEG player).
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    sequence: u64,
    payload_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_to: Option<&'a str>,
    timestamp: String,
}

/// Print one delivered frame. Only the raw format can fail (closed stdout).
pub fn print_frame(frame: &Frame, saved_to: Option<&Path>, format: OutputFormat) -> io::Result<()> {
    let saved = saved_to.map(|path| path.display().to_string());
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                sequence: frame.sequence,
                payload_size: frame.len(),
                saved_to: saved.as_deref(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FRAME", "SIZE", "SAVED TO"])
                .add_row(vec![
                    frame.sequence.to_string(),
                    frame.len().to_string(),
                    saved.unwrap_or_else(|| "-".to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match saved {
            Some(path) => println!("frame={} size={} saved={path}", frame.sequence, frame.len()),
            None => println!("frame={} size={}", frame.sequence, frame.len()),
        },
        OutputFormat::Raw => print_raw(frame.payload.as_ref())?,
    }
    Ok(())
}

pub fn print_raw(data: &[u8]) -> io::Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(data)?;
    out.flush()
}

#[derive(Serialize, Debug)]
struct ReportOutput<'a> {
    end: &'a str,
    frames: u64,
    decode_faults: u64,
    transport_errors: u64,
    overflows: u64,
    resyncs: u64,
    bytes_discarded: u64,
}

impl<'a> From<&'a SessionReport> for ReportOutput<'a> {
    fn from(report: &'a SessionReport) -> Self {
        Self {
            end: report.end.map(|end| end.as_str()).unwrap_or("error"),
            frames: report.frames,
            decode_faults: report.decode_faults,
            transport_errors: report.transport_errors,
            overflows: report.overflows,
            resyncs: report.resyncs,
            bytes_discarded: report.bytes_discarded,
        }
    }
}

#[derive(Serialize)]
struct SessionOutput<'a> {
    session: ReportOutput<'a>,
}

/// Print the end-of-session summary. With raw output stdout carries image
/// bytes, so the summary goes to stderr instead.
pub fn print_report(report: &SessionReport, format: OutputFormat) {
    let out = ReportOutput::from(report);
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&SessionOutput { session: out })
                .unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SESSION", "VALUE"]);
            for (key, value) in report_rows(&out) {
                table.add_row(vec![key.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", report_line(&out)),
        OutputFormat::Raw => eprintln!("{}", report_line(&out)),
    }
}

/// Print ordered key/value pairs (build info and similar).
pub fn print_fields(fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(key, value)| (key.to_string(), serde_json::Value::from(value.as_str())))
                .collect();
            println!("{}", serde_json::Value::Object(map));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KEY", "VALUE"]);
            for (key, value) in fields {
                table.add_row(vec![key.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (key, value) in fields {
                println!("{key}: {value}");
            }
        }
    }
}

fn report_rows(out: &ReportOutput<'_>) -> Vec<(&'static str, String)> {
    vec![
        ("end", out.end.to_string()),
        ("frames", out.frames.to_string()),
        ("decode_faults", out.decode_faults.to_string()),
        ("transport_errors", out.transport_errors.to_string()),
        ("overflows", out.overflows.to_string()),
        ("resyncs", out.resyncs.to_string()),
        ("bytes_discarded", out.bytes_discarded.to_string()),
    ]
}

fn report_line(out: &ReportOutput<'_>) -> String {
    report_rows(out)
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Serialize, Debug)]
pub struct SendSummary {
    pub output: String,
    pub frames: u64,
    pub bytes: u64,
}

pub fn print_send_summary(summary: &SendSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OUTPUT", "FRAMES", "BYTES"])
                .add_row(vec![
                    summary.output.clone(),
                    summary.frames.to_string(),
                    summary.bytes.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "output={} frames={} bytes={}",
            summary.output, summary.frames, summary.bytes
        ),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
