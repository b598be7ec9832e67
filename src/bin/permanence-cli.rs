#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use permanence::{io, Scheduler};
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI minimaliste : résout un planning de gardes depuis un fichier de
/// configuration JSON et émet le rapport sur stdout ou dans un fichier.
///
/// Codes de sortie : 0 couverture ≥ 95 % sans violation, 1 avec violations,
/// 2 couverture < 95 %, 3 erreur de configuration.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Fichier JSON de configuration (plage, postes, effectif, réglages)
    config: String,

    /// Active les logs (feature `logging`)
    #[arg(long)]
    log: bool,

    /// Rapport JSON vers un fichier plutôt que stdout
    #[arg(long)]
    out: Option<String>,

    /// Export CSV du planning à plat
    #[arg(long)]
    csv: Option<String>,

    /// Export CSV des statistiques par travailleur
    #[arg(long)]
    stats_csv: Option<String>,

    /// Point de reprise JSON écrit après résolution
    #[arg(long)]
    checkpoint: Option<String>,

    /// Graine de résolution (écrase celle de la configuration)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }
    #[cfg(not(feature = "logging"))]
    let _ = cli.log;

    let mut config = match io::load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            std::process::exit(3);
        }
    };
    if let Some(seed) = cli.seed {
        config.policy.seed = seed;
    }

    let mut scheduler = match Scheduler::new(config) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(3);
        }
    };
    let report = scheduler.solve()?;

    match &cli.out {
        Some(path) => io::export_report_json(path, &report)
            .with_context(|| format!("writing report to {path}"))?,
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    if let Some(path) = &cli.csv {
        io::export_schedule_csv(path, &report)
            .with_context(|| format!("writing schedule CSV to {path}"))?;
    }
    if let Some(path) = &cli.stats_csv {
        io::export_worker_stats_csv(path, &report)
            .with_context(|| format!("writing stats CSV to {path}"))?;
    }
    if let Some(path) = &cli.checkpoint {
        scheduler
            .builder()
            .checkpoint()
            .save_to(path)
            .with_context(|| format!("writing checkpoint to {path}"))?;
    }

    std::process::exit(report.exit_code());
}
