use anyhow::Context;
use domain_ingest::config::{self, Config};
use domain_ingest::{logging, IngestError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = config::load_dotenv();
    logging::init("info");
    config::report_dotenv(&dotenv);

    let matches = config::command().get_matches();
    let config = Config::from_matches(&matches, config::database_url()?)
        .context("invalid ingest configuration")?;

    // dropping the run future drops the COPY, which the server rolls back
    let report = tokio::select! {
        res = domain_ingest::run(&config) => res.context("ingest failed")?,
        _ = tokio::signal::ctrl_c() => return Err(IngestError::Cancelled.into()),
    };

    let secs = report.elapsed.as_secs_f64();
    tracing::info!(
        copied = report.copied,
        counted = report.counted,
        published = report.published,
        elapsed = format!("{secs:.1}s"),
        rows_per_sec = format!("{:.0}", report.copied as f64 / secs.max(f64::EPSILON)),
        "done"
    );
    Ok(())
}
