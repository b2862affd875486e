use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::LedgerService;
use crate::config::LedgerConfig;
use crate::domain::{AccountId, CurrencyCode, MINOR_EXPONENT, format_minor, parse_minor};

/// Valuta - multi-currency wallet ledger
#[derive(Parser)]
#[command(name = "valuta")]
#[command(about = "A multi-currency wallet ledger with locked balances and currency exchange")]
#[command(version)]
pub struct Cli {
    /// JSON settings file
    #[arg(short, long, env = "VALUTA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file path (overrides the settings file)
    #[arg(short, long, env = "VALUTA_DATABASE")]
    pub database: Option<String>,

    /// Rate service base URL (overrides the settings file)
    #[arg(long, env = "VALUTA_RATE_SERVICE")]
    pub rate_service: Option<String>,

    /// Offline rate, e.g. "USD:EUR=0.90" (repeatable, used without a rate service)
    #[arg(long = "rate", global = true)]
    pub rates: Vec<String>,

    /// Rate lookup timeout in milliseconds
    #[arg(long, env = "VALUTA_RATE_TIMEOUT_MS")]
    pub rate_timeout_ms: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Create zero balances in every supported currency for an account
    Provision {
        /// Account ID (a new one is generated if omitted)
        #[arg(long)]
        account: Option<String>,
    },

    /// Add money to a balance
    Deposit {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Currency code (e.g., USD)
        currency: String,

        #[arg(long)]
        account: String,
    },

    /// Take money from a balance
    Withdraw {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Currency code (e.g., USD)
        currency: String,

        #[arg(long)]
        account: String,
    },

    /// Exchange money between two currencies at the current rate
    Exchange {
        /// Amount of the source currency
        amount: String,

        /// Source currency
        #[arg(long)]
        from: String,

        /// Destination currency
        #[arg(long)]
        to: String,

        #[arg(long)]
        account: String,
    },

    /// Show all balances of an account
    Balance {
        #[arg(long)]
        account: String,
    },

    /// Show current rates from a base currency
    Rates {
        /// Base currency
        #[arg(default_value = "USD")]
        base: String,
    },

    /// List recent balance mutations
    History {
        #[arg(long)]
        account: String,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: history, balances
        export_type: String,

        #[arg(long)]
        account: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Format: csv, json (json only for balances)
        #[arg(short, long, default_value = "csv")]
        format: String,
    },
}

impl Cli {
    /// Settings file, then command-line overrides.
    fn resolve_config(&self) -> Result<LedgerConfig> {
        let mut config = match &self.config {
            Some(path) => LedgerConfig::load(path)?,
            None => LedgerConfig::default(),
        };

        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(url) = &self.rate_service {
            config.rate_service_url = Some(url.clone());
        }
        if !self.rates.is_empty() {
            config.fixed_rates = self.rates.clone();
        }
        if let Some(timeout) = self.rate_timeout_ms {
            config.rate_timeout_ms = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        let service = LedgerService::from_config(&config).await?;

        match self.command {
            Commands::Init => {
                println!("Database initialized: {}", config.database);
            }

            Commands::Provision { account } => {
                let account = match account {
                    Some(id) => parse_account(&id)?,
                    None => Uuid::new_v4(),
                };
                let balances = service.provision_account(account).await?;
                println!("Provisioned account {}", account);
                for (currency, amount) in balances {
                    println!("  {:<4} {:>14}", currency, format_minor(amount, MINOR_EXPONENT));
                }
            }

            Commands::Deposit {
                amount,
                currency,
                account,
            } => {
                let account = parse_account(&account)?;
                let currency = parse_currency(&currency)?;
                let amount = parse_amount(&amount)?;

                let record = service.deposit(account, &currency, amount).await?;
                println!(
                    "Deposited {} {}, balance {} {} ({})",
                    format_minor(amount, MINOR_EXPONENT),
                    currency,
                    format_minor(record.resulting_balance, MINOR_EXPONENT),
                    currency,
                    record.id
                );
            }

            Commands::Withdraw {
                amount,
                currency,
                account,
            } => {
                let account = parse_account(&account)?;
                let currency = parse_currency(&currency)?;
                let amount = parse_amount(&amount)?;

                let record = service.withdraw(account, &currency, amount).await?;
                println!(
                    "Withdrew {} {}, balance {} {} ({})",
                    format_minor(amount, MINOR_EXPONENT),
                    currency,
                    format_minor(record.resulting_balance, MINOR_EXPONENT),
                    currency,
                    record.id
                );
            }

            Commands::Exchange {
                amount,
                from,
                to,
                account,
            } => {
                let account = parse_account(&account)?;
                let from = parse_currency(&from)?;
                let to = parse_currency(&to)?;
                let amount = parse_amount(&amount)?;

                let receipt = service.exchange(account, &from, &to, amount).await?;
                println!(
                    "Exchanged {} {} -> {} {} at {} ({})",
                    format_minor(receipt.withdrawn, MINOR_EXPONENT),
                    from,
                    format_minor(receipt.deposited, MINOR_EXPONENT),
                    to,
                    receipt.rate,
                    receipt.operation_id
                );
            }

            Commands::Balance { account } => {
                let account = parse_account(&account)?;
                let balances = service.get_balances(account).await?;
                println!("{:<8} {:>14}", "CURRENCY", "BALANCE");
                println!("{}", "-".repeat(23));
                for (currency, amount) in balances {
                    println!("{:<8} {:>14}", currency, format_minor(amount, MINOR_EXPONENT));
                }
            }

            Commands::Rates { base } => {
                let base = parse_currency(&base)?;
                for quote in service.exchange_rates(&base).await? {
                    println!("1 {} = {} {}", quote.from, quote.rate, quote.to);
                }
            }

            Commands::History { account, limit } => {
                let account = parse_account(&account)?;
                let mutations = service.history(account, limit).await?;
                if mutations.is_empty() {
                    println!("No mutations found.");
                } else {
                    println!(
                        "{:<25} {:<16} {:<4} {:>14} {:>14}",
                        "RECORDED", "KIND", "CUR", "DELTA", "BALANCE"
                    );
                    println!("{}", "-".repeat(77));
                    for m in mutations {
                        println!(
                            "{:<25} {:<16} {:<4} {:>14} {:>14}",
                            m.recorded_at.format("%Y-%m-%d %H:%M:%S%.3f"),
                            m.kind,
                            m.currency,
                            format_minor(m.delta, MINOR_EXPONENT),
                            format_minor(m.resulting_balance, MINOR_EXPONENT)
                        );
                    }
                }
            }

            Commands::Export {
                export_type,
                account,
                output,
                format,
            } => {
                let account = parse_account(&account)?;
                run_export_command(&service, account, &export_type, output.as_deref(), &format)
                    .await?;
            }
        }

        Ok(())
    }
}

async fn run_export_command(
    service: &LedgerService,
    account: AccountId,
    export_type: &str,
    output: Option<&str>,
    format: &str,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match (export_type, format) {
        ("history", "csv") => {
            let count = exporter.export_history_csv(account, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} mutations", count);
            }
        }
        ("balances", "csv") => {
            let count = exporter.export_balances_csv(account, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        ("balances", "json") => {
            let snapshot = exporter.export_balances_json(account, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", snapshot.balances.len());
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export '{}' as '{}'. Valid: history (csv), balances (csv, json)",
                export_type,
                format
            );
        }
    }

    Ok(())
}

fn parse_account(input: &str) -> Result<AccountId> {
    Uuid::parse_str(input.trim()).context("Invalid account ID format (expected UUID)")
}

fn parse_currency(input: &str) -> Result<CurrencyCode> {
    Ok(CurrencyCode::parse(input)?)
}

fn parse_amount(input: &str) -> Result<i64> {
    parse_minor(input, MINOR_EXPONENT)
        .with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", input))
}
