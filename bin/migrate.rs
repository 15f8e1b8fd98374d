use anyhow::Context;
use clap::{Arg, Command};
use domain_ingest::db::{self, MigrateAction, DEFAULT_MIGRATIONS_DIR};
use domain_ingest::{config, logging};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = config::load_dotenv();
    logging::init("info");
    config::report_dotenv(&dotenv);

    let matches = Command::new("migrate")
        .about("Manage the domain_ranking schema")
        .arg(
            Arg::new("action")
                .help("up (apply all), down (roll back one), reset (down all, then up all)")
                .required(true)
                .value_parser(["up", "down", "reset"]),
        )
        .arg(
            Arg::new("dir")
                .long("dir")
                .default_value(DEFAULT_MIGRATIONS_DIR)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .get_matches();

    let action: MigrateAction = matches
        .get_one::<String>("action")
        .map(String::as_str)
        .unwrap_or("up")
        .parse()?;
    let dir = matches
        .get_one::<PathBuf>("dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_DIR));

    let url = config::database_url()?;
    let pool = db::connect(&url, 1).await.context("connecting to database")?;
    let result = db::migrate(&pool, &dir, action).await;
    pool.close().await;
    result.with_context(|| format!("migrate {action:?} failed"))?;
    Ok(())
}
