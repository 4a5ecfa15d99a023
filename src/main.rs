use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use fieldseal::{
    audit_records, diagnostics::roundtrip_check, generate_secret, migrate_plaintext,
    repair_double_encryption, validate_setup, EncryptionConfig, FieldCipher, JsonRecord,
    MemoryStore, SetupReport, DEFAULT_BATCH_SIZE,
};

#[derive(Parser)]
#[command(
    name = "fieldseal",
    version,
    about = "Field-level encryption at rest: validation, repair, and migration tooling",
    after_help = "\
Record files are JSON arrays of objects; repaired/migrated files are written
back in place.

Environment variables:
  ENCRYPTION_KEY    Secret the field key is derived from (see `fieldseal keygen`)"
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the encryption setup and print a report
    Validate {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a basic encrypt/decrypt round-trip test
    Check,

    /// Generate a new random secret for ENCRYPTION_KEY
    Keygen,

    /// Unwrap multiply-encrypted fields in a record file
    Repair {
        /// Path to a JSON array of records
        file: PathBuf,

        /// Field names to repair (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Records per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Encrypt legacy plaintext fields in a record file
    Migrate {
        /// Path to a JSON array of records
        file: PathBuf,

        /// Field names to encrypt (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Records per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Scan a record file for fields in a suspicious state
    Audit {
        /// Path to a JSON array of records
        file: PathBuf,

        /// Field names to audit (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Records per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = EncryptionConfig::from_env();

    if let Err(e) = run(cli.command, &config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &EncryptionConfig) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Validate { json } => {
            let report = validate_setup(config);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }

        Commands::Check => {
            let cipher = FieldCipher::from_config(config);
            if roundtrip_check(&cipher) {
                println!("roundtrip test passed");
                Ok(())
            } else {
                Err("roundtrip test failed".into())
            }
        }

        Commands::Keygen => {
            println!("{}", generate_secret());
            Ok(())
        }

        Commands::Repair {
            file,
            fields,
            batch_size,
        } => {
            let cipher = FieldCipher::from_config(config);
            let mut store = load_store(&file)?;
            let stats = repair_double_encryption(&mut store, &cipher, &fields, batch_size);
            write_store(&file, store)?;

            println!("processed: {}", stats.processed);
            println!("fixed:     {}", stats.fixed);
            println!("skipped:   {}", stats.skipped);
            println!("failed:    {}", stats.failed);
            Ok(())
        }

        Commands::Migrate {
            file,
            fields,
            batch_size,
        } => {
            // Refuse to write new ciphertext under the fallback secret
            config.ensure_configured()?;
            let cipher = FieldCipher::from_config(config);
            let mut store = load_store(&file)?;
            let stats = migrate_plaintext(&mut store, &cipher, &fields, batch_size);
            write_store(&file, store)?;

            println!("processed: {}", stats.processed);
            println!("encrypted: {}", stats.encrypted);
            println!("failed:    {}", stats.failed);
            Ok(())
        }

        Commands::Audit {
            file,
            fields,
            batch_size,
        } => {
            let cipher = FieldCipher::from_config(config);
            let store = load_store(&file)?;
            let report = audit_records(&store, &cipher, &fields, batch_size);

            for finding in &report.findings {
                println!(
                    "record {} field '{}': {}",
                    finding.record_id, finding.field, finding.reason
                );
            }
            println!("checked: {}", report.checked);
            println!("flagged: {}", report.flagged);
            Ok(())
        }
    }
}

fn print_report(report: &SetupReport) {
    let status = |ok: bool| if ok { "yes" } else { "NO" };

    println!("encryption enabled: {}", status(report.encryption_enabled));
    println!("key configured:     {}", status(report.key_configured));
    println!(
        "roundtrip test:     {}",
        if report.roundtrip_ok {
            "passed"
        } else {
            "FAILED"
        }
    );

    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for rec in &report.recommendations {
            println!("  - {rec}");
        }
    }
}

fn load_store(path: &Path) -> Result<MemoryStore<JsonRecord>, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let records: Vec<JsonRecord> = serde_json::from_str(&text)
        .map_err(|e| format!("{} is not a JSON array of records: {e}", path.display()))?;
    Ok(MemoryStore::from_records(records))
}

fn write_store(path: &Path, store: MemoryStore<JsonRecord>) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(&store.into_records())?;
    std::fs::write(path, json).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    Ok(())
}
