use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use swift_registry::config::{DB_PATH_ENV, DEFAULT_DB_PATH};
use swift_registry::{
    count_swift_codes, delete_swift_code, find_by_code, find_by_country, find_by_hq_code,
    import_rows, init_tracing, load_source, open_database, SwiftCode,
};

#[derive(Parser)]
#[command(name = "swift-registry", version, about = "SWIFT/BIC code registry")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = DB_PATH_ENV, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import an .xlsx or .csv file in one batch
    Import { file: PathBuf },
    /// Show one code (and its branches for a headquarters)
    Lookup { swift_code: String },
    /// List every code for a country
    Country { country_iso2: String },
    /// Remove one code
    Delete { swift_code: String },
}

fn main() -> Result<()> {
    init_tracing();
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let mut conn = open_database(&cli.db)
        .with_context(|| format!("Failed to open database {}", cli.db.display()))?;

    match cli.command {
        Command::Import { file } => {
            println!("📂 Loading {}...", file.display());
            let (format, rows) = load_source(&file)
                .with_context(|| format!("Failed to import SWIFT codes from {}", file.display()))?;
            println!("✓ Read {} rows ({})", rows.len(), format.name());

            let report = import_rows(&rows, &mut conn).context("Import failed")?;
            println!("✓ {}", report.summary());
            println!("✓ Database contains {} SWIFT codes", count_swift_codes(&conn)?);
        }
        Command::Lookup { swift_code } => match find_by_code(&conn, &swift_code)? {
            Some(record) => {
                print_record(&record);
                if record.is_headquarter {
                    let branches = find_by_hq_code(&conn, &record.swift_code)?;
                    println!("   Branches: {}", branches.len());
                    for branch in &branches {
                        println!("   └─ {} {}", branch.swift_code, branch.address);
                    }
                }
            }
            None => bail!("SWIFT code not found: {}", swift_code),
        },
        Command::Country { country_iso2 } => {
            let records = find_by_country(&conn, &country_iso2)?;
            if records.is_empty() {
                bail!("No SWIFT codes found for {}", country_iso2.to_uppercase());
            }
            println!(
                "🌍 {} ({}): {} codes",
                country_iso2.to_uppercase(),
                records[0].country_name,
                records.len()
            );
            for record in &records {
                print_record(record);
            }
        }
        Command::Delete { swift_code } => {
            if delete_swift_code(&conn, &swift_code)? {
                println!("✓ Deleted {}", swift_code);
            } else {
                bail!("SWIFT code not found: {}", swift_code);
            }
        }
    }

    Ok(())
}

fn print_record(record: &SwiftCode) {
    let kind = if record.is_headquarter { "HQ" } else { "branch" };
    println!(
        "🏦 {} [{}] {} | {} | {} {}",
        record.swift_code,
        kind,
        record.bank_name,
        record.address,
        record.country_iso2,
        record.country_name
    );
    if let Some(hq) = &record.hq_swift_code {
        println!("   ↳ headquarters: {}", hq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(db: &std::path::Path, args: &[&str]) -> Cli {
        let db = db.to_str().unwrap();
        let mut argv = vec!["swift-registry", "--db", db];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_missing_code_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cli.db");

        let err = run(cli(&db, &["lookup", "NOPEPLPWXXX"])).unwrap_err();
        assert!(err.to_string().contains("SWIFT code not found: NOPEPLPWXXX"));

        let err = run(cli(&db, &["delete", "NOPEPLPWXXX"])).unwrap_err();
        assert!(err.to_string().contains("SWIFT code not found"));

        let err = run(cli(&db, &["country", "fr"])).unwrap_err();
        assert!(err.to_string().contains("No SWIFT codes found for FR"));
    }

    #[test]
    fn test_import_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cli.db");
        let file = dir.path().join("codes.csv");
        std::fs::write(
            &file,
            "COUNTRY ISO2 CODE,SWIFT CODE,CODE TYPE,NAME,ADDRESS,TOWN NAME,COUNTRY NAME\n\
             PL,BPKOPLPWXXX,BIC11,PKO,WARSZAWA,WARSZAWA,POLAND\n",
        )
        .unwrap();

        run(cli(&db, &["import", file.to_str().unwrap()])).unwrap();
        run(cli(&db, &["lookup", "BPKOPLPWXXX"])).unwrap();
        run(cli(&db, &["delete", "BPKOPLPWXXX"])).unwrap();
    }
}
