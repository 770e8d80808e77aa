//! sqlforge: query rendering diagnostics
//!
//! # Usage
//!
//! ```bash
//! # Render a serialized query state for a driver
//! sqlforge render --driver pgsql query.json
//!
//! # Render and execute it
//! sqlforge render --driver sqlite3 query.json --execute --database-url sqlite://app.db
//!
//! # Quote an identifier
//! sqlforge quote --driver sqlsrv "dbo.Order Lines"
//!
//! # Show the effective configuration
//! sqlforge config
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use sqlforge::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlforge")]
#[command(version)]
#[command(about = "Render and inspect sqlforge queries", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlforge render --driver mysql query.json
    sqlforge render --driver pgsql query.json --execute
    sqlforge quote --driver sqlsrv 'dbo.Order Lines'")]
struct Cli {
    /// Config file (defaults to <config dir>/sqlforge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a JSON-serialized query state
    Render {
        /// Driver identifier (mysql, pgsql, sqlsrv, sqlite3, ...)
        #[arg(short, long)]
        driver: String,

        /// JSON file holding the query state
        file: PathBuf,

        /// Execute the query and print its rows
        #[arg(short, long)]
        execute: bool,

        /// Database connection URL
        #[arg(long, env = "SQLFORGE_DATABASE_URL")]
        database_url: Option<String>,

        /// Output format for executed rows
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Quote an identifier for a driver
    Quote {
        #[arg(short, long)]
        driver: String,

        ident: String,
    },
    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("sqlforge=debug")
    } else {
        EnvFilter::try_from_env("SQLFORGE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("sqlforge=warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ForgeConfig::load(path).with_context(|| format!("reading {}", path.display()))?,
        None => ForgeConfig::load_default()?,
    };

    match &cli.command {
        Commands::Render {
            driver,
            file,
            execute,
            database_url,
            format,
        } => render(&config, driver, file, *execute, database_url.as_deref(), format),
        Commands::Quote { driver, ident } => {
            println!("{}", Dialect::from_driver(driver).quote_qualified(ident));
            Ok(())
        }
        Commands::Config => {
            if let Some(path) = ForgeConfig::default_path() {
                println!("{} {}", "# default path:".dimmed(), path.display());
            }
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn render(
    config: &ForgeConfig,
    driver: &str,
    file: &Path,
    execute: bool,
    database_url: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let state: QueryState = serde_json::from_str(&content).context("parsing query state")?;

    let connection: Arc<dyn Connection> = if execute {
        let Some(url) = database_url else {
            bail!("--execute needs --database-url or SQLFORGE_DATABASE_URL");
        };
        let conn = SqlxConnection::connect(url)?;
        let expected = Dialect::from_driver(driver);
        let actual = Dialect::from_driver(conn.driver());
        if expected != actual {
            bail!("--driver {} does not match the {} database URL", driver, actual);
        }
        Arc::new(conn)
    } else {
        Arc::new(OfflineConnection::new(driver))
    };

    let ctx = DbContext::from_config(connection, config);
    let query = QueryBuilder::from_state(&ctx, state);
    let statement = query.to_statement();

    println!("{}", "Generated SQL:".green().bold());
    println!("{}", statement.sql.white());
    if !statement.params.is_empty() {
        println!();
        println!("{}", "Bindings:".cyan());
        for (i, value) in statement.params.iter().enumerate() {
            let shown = serde_json::to_string(value).unwrap_or_default();
            println!("  {} = {}", ctx.dialect().placeholder(i + 1), shown.yellow());
        }
    }
    if let Some(seconds) = statement.timeout_seconds {
        println!("{} {}s", "Timeout:".dimmed(), seconds);
    }

    if execute {
        println!();
        let rows = query.to_list()?;
        format_output(&rows, format);
    }
    Ok(())
}

fn format_output(results: &[Row], format: &OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            // Stable column order across rows
            let columns: Vec<&String> = results
                .iter()
                .flat_map(|row| row.keys())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let widths: Vec<usize> = columns
                .iter()
                .map(|c| {
                    results
                        .iter()
                        .filter_map(|row| row.get(*c))
                        .map(|v| val_to_string(v).chars().count())
                        .fold(c.chars().count(), usize::max)
                })
                .collect();

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = *w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .zip(&widths)
                    .map(|(c, w)| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = *w)
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}
