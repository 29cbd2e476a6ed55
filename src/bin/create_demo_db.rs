use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use rust_decimal_macros::dec;
use time::{Duration, OffsetDateTime};

use balancebook::{
    account::{create_account, get_account},
    entry::get_ledger,
    initialize_db,
    recurring::{RecurringTemplate, create_template, run_recurring_sweep},
    transaction::{Transaction, create_transaction},
};

/// A utility for creating a demo database for balancebook.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,

    /// How many days of transaction history to seed before today.
    #[arg(long, default_value_t = 90)]
    history_days: i64,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "balancebook=debug".into()),
        )
        .init();

    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating demo account...");

    let today = OffsetDateTime::now_utc().date();
    let history_start = today - Duration::days(args.history_days);

    let account = create_account("Checking", &conn)?;

    create_transaction(
        Transaction::build(account.id, dec!(1200), history_start, "Opening balance")
            .category("Transfers"),
        &conn,
    )?;
    create_transaction(
        Transaction::build(
            account.id,
            dec!(-63.27),
            history_start + Duration::days(2),
            "Grocer",
        )
        .category("Groceries"),
        &conn,
    )?;

    create_template(
        RecurringTemplate::build(account.id, dec!(-900), history_start, "Landlord")
            .category("Housing")
            .notes("rent")
            .frequency_days(30),
        &conn,
    )?;
    create_template(
        RecurringTemplate::build(account.id, dec!(-15.49), history_start, "Netflix")
            .category("Entertainment")
            .frequency_days(30)
            .total_occurrences(Some(12)),
        &conn,
    )?;
    create_template(
        RecurringTemplate::build(account.id, dec!(2200), history_start, "Employer")
            .category("Income")
            .notes("salary")
            .frequency_days(14),
        &conn,
    )?;

    println!("Generating due occurrences...");
    let generated = run_recurring_sweep(today, &conn)?;
    println!("Generated {generated} transactions.");

    let account = get_account(account.id, &conn)?;
    println!("{}: {}", account.name, account.balance);

    for entry in get_ledger(account.id, &conn)? {
        println!("{}", entry.to_record());
    }

    println!("Success!");

    Ok(())
}
