use std::{
    error::Error,
    process::ExitCode,
    sync::{Arc, Mutex},
};

use clap::Parser;
use rusqlite::Connection;
use time::{Date, macros::format_description};
use tracing_subscriber::EnvFilter;

use tresorier::{PersistenceGateway, RecurrenceEngine, SqliteGateway, initialize_db, local_today};

/// Apply the recurring rules due this month once, e.g. from a daily cron job.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "TRESORIER_DB_PATH")]
    db_path: String,

    /// The canonical name of the association's timezone, the same as the
    /// server's. Recurring charges fall due on dates in this timezone.
    #[arg(long, env = "TRESORIER_TIMEZONE", default_value = "Etc/UTC")]
    timezone: String,

    /// Apply the rules as if today was this date (YYYY-MM-DD). Defaults to
    /// today in the association's timezone.
    #[arg(long, value_parser = parse_date)]
    date: Option<Date>,
}

fn parse_date(text: &str) -> Result<Date, String> {
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .map_err(|error| format!("expected a date like 2024-06-05: {error}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

/// The date given on the command line, or today in `timezone`.
///
/// The timezone is checked even when a date is given.
fn resolve_today(date: Option<Date>, timezone: &str) -> Result<Date, tresorier::Error> {
    let today = local_today(timezone)?;

    Ok(date.unwrap_or(today))
}

async fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let today = resolve_today(args.date, &args.timezone)?;

    let connection = Connection::open(&args.db_path)?;
    initialize_db(&connection)?;

    let gateway = SqliteGateway::new(Arc::new(Mutex::new(connection)));

    let rules = gateway.list_recurring_rules().await?;
    let report = RecurrenceEngine::new(&gateway).run(&rules, today).await;

    println!(
        "{}: created {} transaction(s) from {} rule(s), {} failure(s).",
        report.month,
        report.materialized_count(),
        rules.len(),
        report.failure_count()
    );

    if report.failure_count() > 0 {
        return Err("some recurring rules could not be applied, see the logs".into());
    }

    Ok(())
}
