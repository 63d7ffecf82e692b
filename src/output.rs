use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{Context, Result};

use crate::types::{ProbeReport, ProbeResult};

/// Render one country bucket as relay-list lines, best latency first.
pub fn country_file_text(entries: &[ProbeResult]) -> String {
    let mut out = String::new();
    for e in entries {
        out.push_str(&e.display_line());
        out.push('\n');
    }
    out
}

/// Render the per-country summary: count and mean latency per bucket, plus a
/// grand total.
pub fn summary_text(buckets: &BTreeMap<String, Vec<ProbeResult>>) -> String {
    let mut out = String::new();
    out.push_str("# probe run summary\n");
    out.push_str(&format!("# generated: {}\n\n", now_rfc3339()));

    let mut total = 0usize;
    for (country, entries) in buckets {
        if entries.is_empty() {
            continue;
        }
        total += entries.len();
        let mean: u64 =
            entries.iter().map(|e| e.latency_ms).sum::<u64>() / entries.len() as u64;
        out.push_str(&format!(
            "{country}: {} address(es), mean latency {mean}ms\n",
            entries.len()
        ));
    }
    out.push_str(&format!("\ntotal: {total} address(es)\n"));
    out
}

/// Write one `<CC>.txt` per non-empty bucket plus `summary.txt` into `dir`,
/// creating the directory if needed.
pub fn write_country_files(dir: impl AsRef<Path>, report: &ProbeReport) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;

    for (country, entries) in &report.buckets {
        if entries.is_empty() {
            continue;
        }
        let path = dir.join(format!("{country}.txt"));
        std::fs::write(&path, country_file_text(entries))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let summary_path = dir.join("summary.txt");
    std::fs::write(&summary_path, summary_text(&report.buckets))
        .with_context(|| format!("failed to write {}", summary_path.display()))?;
    Ok(())
}

/// Write the full report as pretty JSON.
pub fn write_report_json(path: impl AsRef<Path>, report: &ProbeReport) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("failed to create {}", path.as_ref().display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

/// Print the accepted results as an aligned table, one bucket after another.
pub fn print_report_table(report: &ProbeReport) {
    let mut ip_w = 2usize.max("ip".len());
    for e in report.buckets.values().flatten() {
        ip_w = ip_w.max(e.ip.len());
    }
    let port_w = 4usize.max("port".len());
    let lat_w = 9usize.max("latency_ms".len());

    println!(
        "\nAccepted: {} (scanned: {}, failed: {}, rejected: {})",
        report.accepted, report.scanned, report.failed, report.rejected
    );
    for (country, entries) in &report.buckets {
        if entries.is_empty() {
            continue;
        }
        println!("\n[{country}] {} address(es)", entries.len());
        println!(
            "{:<ip_w$}  {:>port_w$}  {:>lat_w$}",
            "ip",
            "port",
            "latency_ms",
            ip_w = ip_w,
            port_w = port_w,
            lat_w = lat_w
        );
        println!(
            "{:-<ip_w$}  {:-<port_w$}  {:-<lat_w$}",
            "",
            "",
            "",
            ip_w = ip_w,
            port_w = port_w,
            lat_w = lat_w
        );
        for e in entries {
            println!(
                "{:<ip_w$}  {:>port_w$}  {:>lat_w$}",
                e.ip,
                e.port,
                e.latency_ms,
                ip_w = ip_w,
                port_w = port_w,
                lat_w = lat_w
            );
        }
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
