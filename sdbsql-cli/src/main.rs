use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sdbsql_api::{Connection, ConnectionConfig, MemoryStore, MemoryStoreConfig, Rows, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod shell;
mod table;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Table format (default)
    Table,
    /// Pretty JSON
    Json,
    /// JSON Lines (one row per line)
    Jsonl,
}

#[derive(Parser)]
#[command(name = "sdbsql")]
#[command(about = "SQL over a SimpleDB-style attribute store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that opens a store
#[derive(Args, Clone, Debug, Default)]
struct StoreArgs {
    /// JSON snapshot to load before and save after the command
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
    /// Schema prefix for domain names (`schema.table`)
    #[arg(long)]
    schema: Option<String>,
    /// Table synonym as TABLE=DOMAIN, may be repeated
    #[arg(long = "synonym", value_parser = parse_synonym)]
    synonyms: Vec<(String, String)>,
    /// Items per select page
    #[arg(long)]
    page_size: Option<usize>,
    /// Per-request deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a statement that returns no rows
    Exec {
        #[command(flatten)]
        store: StoreArgs,
        /// sdbsql statement
        sql: String,
        /// Placeholder argument; prefix with int:, float:, bool:, time:, binary: or use null
        #[arg(short, long = "arg")]
        args: Vec<String>,
    },
    /// Run a select and print its rows
    Query {
        #[command(flatten)]
        store: StoreArgs,
        /// sdbsql select statement
        sql: String,
        /// Placeholder argument
        #[arg(short, long = "arg")]
        args: Vec<String>,
        /// Maximum number of rows to print
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output format (table, json, jsonl)
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Start interactive shell
    Shell {
        #[command(flatten)]
        store: StoreArgs,
    },
}

/// An open store and the connection over it
pub struct Session {
    pub store: MemoryStore,
    pub connection: Connection,
    pub snapshot: Option<PathBuf>,
}

impl Session {
    fn open(args: &StoreArgs) -> Result<Self> {
        let mut store_config = MemoryStoreConfig::default();
        if let Some(page_size) = args.page_size {
            store_config = store_config.with_page_size(page_size);
        }

        let store = match &args.snapshot {
            Some(path) if path.exists() => MemoryStore::load(path, store_config)
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?,
            _ => MemoryStore::with_config(store_config),
        };

        let mut config = ConnectionConfig::new();
        if let Some(schema) = &args.schema {
            config = config.with_schema(schema.clone());
        }
        for (table, domain) in &args.synonyms {
            config = config.with_synonym(table.clone(), domain.clone());
        }
        if let Some(ms) = args.timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(ms));
        }

        debug!(
            snapshot = ?args.snapshot,
            domains = store.domain_names().len(),
            page_size = store.config().page_size,
            "store opened"
        );
        let connection = Connection::with_config(Arc::new(store.clone()), config);
        Ok(Self {
            store,
            connection,
            snapshot: args.snapshot.clone(),
        })
    }

    /// Write the store back to its snapshot file, if it has one
    pub fn save(&self) -> Result<()> {
        if let Some(path) = &self.snapshot {
            self.store
                .save(path)
                .with_context(|| format!("Failed to save snapshot {}", path.display()))?;
            info!(path = %path.display(), "snapshot saved");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Exec { store, sql, args } => {
            let session = Session::open(&store)?;
            let args = parse_args(&args)?;

            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime
                .block_on(session.connection.execute(&sql, &args))
                .context("Failed to execute statement")?;

            match result.rows_affected() {
                Some(n) => println!("✓ {} row{} affected", n, if n == 1 { "" } else { "s" }),
                None => println!("✓ Statement executed"),
            }
            session.save()?;
        }

        Commands::Query {
            store,
            sql,
            args,
            limit,
            output,
        } => {
            let session = Session::open(&store)?;
            let args = parse_args(&args)?;

            let runtime = tokio::runtime::Runtime::new()?;
            let (columns, rows) = runtime
                .block_on(async {
                    let rows = session.connection.query(&sql, &args).await?;
                    read_rows(rows, limit).await
                })
                .context("Failed to run query")?;

            print_rows(&columns, &rows, output)?;
        }

        Commands::Shell { store } => {
            let session = Session::open(&store)?;
            let mut shell = shell::Shell::new(session)?;
            shell.run()?;
        }
    }

    Ok(())
}

/// Drain a cursor, stopping after `limit` rows
pub async fn read_rows(
    mut rows: Rows,
    limit: Option<usize>,
) -> sdbsql_api::Result<(Vec<String>, Vec<Vec<Value>>)> {
    let columns = rows.columns().to_vec();
    let mut out = Vec::new();
    while limit.map_or(true, |l| out.len() < l) {
        match rows.next_row().await? {
            Some(row) => out.push(row),
            None => break,
        }
    }
    rows.close();
    Ok((columns, out))
}

fn print_rows(columns: &[String], rows: &[Vec<Value>], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Table => {
            println!("{}", table::format_rows_table(columns, rows));
            println!();
            println!("Count: {}", rows.len());
        }
        OutputFormat::Json => {
            let json_rows: Vec<_> = rows.iter().map(|r| table::row_to_json(columns, r)).collect();
            println!("{}", serde_json::to_string_pretty(&json_rows)?);
        }
        OutputFormat::Jsonl => {
            for row in rows {
                println!("{}", serde_json::to_string(&table::row_to_json(columns, row))?);
            }
        }
    }
    Ok(())
}

fn parse_synonym(s: &str) -> Result<(String, String)> {
    let (table, domain) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected TABLE=DOMAIN, found {:?}", s))?;
    if table.is_empty() || domain.is_empty() {
        bail!("expected TABLE=DOMAIN, found {:?}", s);
    }
    Ok((table.to_string(), domain.to_string()))
}

fn parse_args(args: &[String]) -> Result<Vec<Value>> {
    args.iter().map(|a| parse_arg(a)).collect()
}

/// Parse one command-line argument into a typed value.
///
/// Untagged text is a string; `null` is the null value.
pub fn parse_arg(arg: &str) -> Result<Value> {
    if arg == "null" {
        return Ok(Value::Null);
    }
    let Some((tag, text)) = arg.split_once(':') else {
        return Ok(Value::from(arg));
    };
    let value = match tag {
        "int" => Value::Int(text.parse().with_context(|| format!("invalid int {:?}", text))?),
        "float" => Value::Float(text.parse().with_context(|| format!("invalid float {:?}", text))?),
        "bool" => Value::Bool(text.parse().with_context(|| format!("invalid bool {:?}", text))?),
        "time" => Value::Timestamp(
            DateTime::parse_from_rfc3339(text)
                .with_context(|| format!("invalid RFC 3339 time {:?}", text))?
                .with_timezone(&Utc),
        ),
        "binary" => Value::binary(
            STANDARD
                .decode(text)
                .with_context(|| format!("invalid base64 {:?}", text))?,
        ),
        "string" => Value::from(text),
        _ => Value::from(arg),
    };
    Ok(value)
}
