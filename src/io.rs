use crate::model::RosterConfig;
use crate::report::SolveReport;
use anyhow::{bail, Context};
use csv::WriterBuilder;
use std::fs;
use std::path::Path;

/// Charge et valide un document de configuration JSON.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<RosterConfig> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let config: RosterConfig = serde_json::from_slice(&data)
        .with_context(|| format!("parsing config {}", path.display()))?;
    if let Err(reason) = config.validate() {
        bail!("invalid configuration: {reason}");
    }
    Ok(config)
}

/// Export JSON du rapport (jolie mise en forme).
pub fn export_report_json<P: AsRef<Path>>(path: P, report: &SolveReport) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(report)?;
    fs::write(path, s)?;
    Ok(())
}

/// Export CSV du planning à plat : header `date,post,worker`.
pub fn export_schedule_csv<P: AsRef<Path>>(path: P, report: &SolveReport) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_path(path)?;
    w.write_record(["date", "post", "worker"])?;
    for (date, posts) in &report.schedule {
        for (post, worker) in posts.iter().enumerate() {
            w.write_record([&date.to_string(), &post.to_string(), worker])?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Export CSV des statistiques par travailleur.
pub fn export_worker_stats_csv<P: AsRef<Path>>(
    path: P,
    report: &SolveReport,
) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_path(path)?;
    w.write_record([
        "worker",
        "target",
        "assigned",
        "weekend_count",
        "last_post_count",
        "deviation_percent",
        "band",
    ])?;
    for stats in &report.worker_stats {
        w.write_record([
            stats.worker.as_str(),
            &stats.target.to_string(),
            &stats.assigned.to_string(),
            &stats.weekend_count.to_string(),
            &stats.last_post_count.to_string(),
            &format!("{:.2}", stats.deviation_percent),
            &format!("{:?}", stats.band).to_lowercase(),
        ])?;
    }
    w.flush()?;
    Ok(())
}
