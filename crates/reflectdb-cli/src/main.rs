//! Command-line exporter: JSON source database in, relocatable blob out.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reflectdb_core::Database;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "reflectdb", version, about = "Export reflection databases as relocatable binary blobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a source database to a relocatable binary blob
    Export {
        /// Source database, JSON
        input: PathBuf,
        /// Output blob path
        #[arg(short, long)]
        output: PathBuf,
        /// Also write a text dump of the exported scope hierarchy
        #[arg(long)]
        dump: Option<PathBuf>,
        /// Write the blob even when some references fail to resolve
        #[arg(long)]
        allow_unresolved: bool,
    },
    /// Print the scope hierarchy of a source database
    Dump {
        /// Source database, JSON
        input: PathBuf,
    },
    /// Check that every reference in a source database resolves
    Verify {
        /// Source database, JSON
        input: PathBuf,
    },
}

fn load_database(path: &Path) -> Result<Database> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Database::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Export {
            input,
            output,
            dump,
            allow_unresolved,
        } => {
            let db = load_database(&input)?;
            let (mut image, report) = reflectdb_export::export(&db);
            for entry in &report.unresolved {
                eprintln!("error: {entry}");
            }
            if let Some(path) = dump {
                reflectdb_export::dump_to_file(&image, &path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            if !report.is_ok() && !allow_unresolved {
                bail!(
                    "{} unresolved references; blob not written",
                    report.unresolved.len()
                );
            }
            reflectdb_export::save_to_file(&mut image, &output)?;
            Ok(())
        }
        Command::Dump { input } => {
            let db = load_database(&input)?;
            let (image, report) = reflectdb_export::export(&db);
            print!("{}", reflectdb_export::dump_text(&image));
            if !report.is_ok() {
                bail!("{} unresolved references", report.unresolved.len());
            }
            Ok(())
        }
        Command::Verify { input } => {
            let db = load_database(&input)?;
            let (_, report) = reflectdb_export::export(&db);
            for entry in &report.unresolved {
                eprintln!("error: {entry}");
            }
            if !report.is_ok() {
                bail!("{} unresolved references", report.unresolved.len());
            }
            println!("ok: every reference resolves");
            Ok(())
        }
    }
}
