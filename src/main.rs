use anyhow::{bail, Result};
use rankpivot::{pipeline, Config, Decision};
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "usage: rankpivot status | rankpivot update <months|categories|both|none>";

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) config & thread pool ─────────────────────────────────────
    let cfg = Config::from_env()?;
    if let Some(n) = cfg.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .ok();
    }
    info!(
        "data root {}, output {}",
        cfg.data_root.display(),
        cfg.output_dir.display()
    );

    // ─── 3) dispatch ─────────────────────────────────────────────────
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("status") => status(&cfg),
        Some("update") => {
            let Some(raw) = args.get(1) else {
                bail!("{}", USAGE);
            };
            let decision: Decision = raw.parse().map_err(anyhow::Error::msg)?;
            update(&cfg, decision)
        }
        _ => bail!("{}", USAGE),
    }
}

fn status(cfg: &Config) -> Result<()> {
    for (country, result) in pipeline::status(cfg)? {
        match result {
            Ok(delta) if delta.is_empty() => info!("{}: up to date", country),
            Ok(delta) => {
                info!(
                    "{}: new months [{}], ~{} new keywords",
                    country,
                    delta
                        .new_months
                        .iter()
                        .map(|m| m.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                    delta.new_keywords_estimate
                );
                if delta.has_category_work() {
                    info!(
                        "{}: new categories {:?} (`update categories`)",
                        country, delta.new_categories
                    );
                }
                if delta.has_month_work() {
                    for (category, months) in &delta.pending_months {
                        info!(
                            "{}: `{}` has {} pending months (`update months`)",
                            country,
                            category,
                            months.len()
                        );
                    }
                }
            }
            Err(e) => error!("{}: status failed: {:#}", country, e),
        }
    }
    Ok(())
}

fn update(cfg: &Config, decision: Decision) -> Result<()> {
    let mut failed = 0usize;
    for (country, result) in pipeline::update(cfg, decision)? {
        match result {
            Ok(report) => {
                if let Some(anchor) = &report.created_from {
                    info!("{}: new table from `{}`", country, anchor);
                }
                for (op, summary) in &report.applied {
                    info!(
                        "{}: `{}` +{} rows, {} cells, {} ranks filtered",
                        country,
                        op.category(),
                        summary.new_rows,
                        summary.cells_written,
                        summary.ranks_filtered
                    );
                }
                if let Some(e) = &report.failure {
                    warn!("{}: stopped after {} operations: {}", country, report.applied.len(), e);
                    failed += 1;
                }
            }
            Err(e) => {
                error!("{}: update failed: {:#}", country, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} countries did not finish", failed);
    }
    Ok(())
}
