/// Interactive REPL shell for sdbsql
///
/// Provides line editing, history, keyword completion and meta-commands
/// over one connection to an in-process store.

use crate::{read_rows, table, Session};
use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::{
    completion::{Completer, Pair},
    highlight::Highlighter,
    hint::Hinter,
    validate::Validator,
    Helper,
};
use sdbsql_core::parse::{parse, Statement};
use std::path::PathBuf;

const META_COMMANDS: &[&str] = &[
    ".help", ".exit", ".quit", ".tables", ".format", ".timer", ".save", ".clear",
];

const KEYWORDS: &[&str] = &[
    "select", "from", "where", "insert", "into", "values", "update", "set", "delete", "create",
    "drop", "table", "and", "or", "not", "like", "in", "between", "is", "null", "order", "by",
    "limit", "asc", "desc", "every", "id", "consistent", "upsert",
];

/// Completion helper for keywords and meta-commands
#[derive(Clone, Default)]
struct SqlCompleter;

impl SqlCompleter {
    fn candidates(words: &[&str], prefix: &str) -> Vec<Pair> {
        let prefix = prefix.to_ascii_lowercase();
        words
            .iter()
            .filter(|w| w.starts_with(&prefix))
            .map(|w| Pair {
                display: w.to_string(),
                replacement: w.to_string(),
            })
            .collect()
    }
}

impl Completer for SqlCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_prefix = &line[..pos];

        if line_prefix.starts_with('.') {
            return Ok((0, Self::candidates(META_COMMANDS, line_prefix)));
        }

        let word_start = line_prefix
            .rfind(|c: char| c.is_whitespace() || c == '(' || c == ',')
            .map_or(0, |i| i + 1);
        Ok((word_start, Self::candidates(KEYWORDS, &line_prefix[word_start..])))
    }
}

impl Hinter for SqlCompleter {
    type Hint = String;
}

impl Highlighter for SqlCompleter {}

impl Validator for SqlCompleter {}

impl Helper for SqlCompleter {}

/// Output format for query results
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Interactive shell session state
pub struct Shell {
    session: Session,
    runtime: tokio::runtime::Runtime,
    editor: rustyline::Editor<SqlCompleter, rustyline::history::FileHistory>,
    format: OutputFormat,
    show_timing: bool,
}

fn history_path() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".sdbsql_history"))
        .unwrap_or_else(|| ".sdbsql_history".into())
}

/// Returns true if a statement produces rows. Unparseable input goes to
/// `execute`, which reports the syntax error.
fn is_query(sql: &str) -> bool {
    matches!(parse(sql), Ok(Statement::Select(_)))
}

impl Shell {
    /// Create a new shell session
    pub fn new(session: Session) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;

        let mut editor = rustyline::Editor::new().context("Failed to initialize line editor")?;
        editor.set_helper(Some(SqlCompleter));

        let history = history_path();
        if history.exists() {
            let _ = editor.load_history(&history);
        }

        Ok(Self {
            session,
            runtime,
            editor,
            format: OutputFormat::Table,
            show_timing: true,
        })
    }

    /// Run the interactive REPL
    pub fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() {
                format!("{} ", "sdbsql>".green().bold())
            } else {
                format!("{}    ", "...>".dimmed())
            };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() && buffer.is_empty() {
                        continue;
                    }
                    if buffer.is_empty() && (line == ".exit" || line == ".quit") {
                        break;
                    }

                    if !buffer.is_empty() {
                        buffer.push('\n');
                    }
                    buffer.push_str(line);

                    // meta-commands are single line, statements end with ';'
                    if buffer.starts_with('.') || buffer.trim_end().ends_with(';') {
                        let input = buffer.trim().to_string();
                        buffer.clear();
                        let _ = self.editor.add_history_entry(input.as_str());

                        if let Err(e) = self.execute(&input) {
                            eprintln!("{} {:#}", "Error:".red().bold(), e);
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error reading line: {}", err);
                    break;
                }
            }
        }

        self.session.save()?;
        self.editor
            .save_history(&history_path())
            .context("Failed to save command history")?;
        println!();
        Ok(())
    }

    fn execute(&mut self, input: &str) -> Result<()> {
        if input.starts_with('.') {
            return self.execute_meta_command(input);
        }
        let sql = input.trim_end_matches(';').trim();
        if sql.is_empty() {
            return Ok(());
        }
        self.execute_statement(sql)
    }

    fn execute_meta_command(&mut self, command: &str) -> Result<()> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or_default();

        match cmd {
            ".help" => self.show_help(),
            ".tables" => self.show_tables(),
            ".format" => match parts.get(1) {
                Some(format) => self.set_format(format),
                None => {
                    println!("Usage: .format <table|json>");
                    println!("Current format: {:?}", self.format);
                }
            },
            ".timer" => match parts.get(1) {
                Some(value) => self.set_timer(value),
                None => {
                    println!("Usage: .timer <on|off>");
                    println!("Current: {}", if self.show_timing { "on" } else { "off" });
                }
            },
            ".save" => {
                if let Some(path) = parts.get(1) {
                    self.session.snapshot = Some(PathBuf::from(path));
                }
                match &self.session.snapshot {
                    Some(path) => {
                        self.session.save()?;
                        println!("Saved to {}", path.display());
                    }
                    None => println!("Usage: .save <path>"),
                }
            }
            ".clear" => print!("\x1B[2J\x1B[1;1H"),
            _ => {
                println!("{} {}", "Unknown command:".yellow(), cmd);
                println!("Type .help for available commands");
            }
        }
        Ok(())
    }

    fn execute_statement(&mut self, sql: &str) -> Result<()> {
        let start = std::time::Instant::now();
        let connection = &self.session.connection;

        let count = if is_query(sql) {
            let (columns, rows) = self.runtime.block_on(async {
                let rows = connection.query(sql, &[]).await?;
                read_rows(rows, None).await
            })?;
            match self.format {
                OutputFormat::Table => println!("{}", table::format_rows_table(&columns, &rows)),
                OutputFormat::Json => {
                    let json: Vec<_> = rows.iter().map(|r| table::row_to_json(&columns, r)).collect();
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
            }
            Some(rows.len() as u64)
        } else {
            let result = self.runtime.block_on(connection.execute(sql, &[]))?;
            println!("{}", "OK".green());
            result.rows_affected()
        };

        if self.show_timing {
            let elapsed = start.elapsed().as_secs_f64() * 1000.0;
            match count {
                Some(n) => println!(
                    "{} ({:.2}ms)",
                    format!("{} row{}", n, if n == 1 { "" } else { "s" }).dimmed(),
                    elapsed
                ),
                None => println!("{}", format!("({:.2}ms)", elapsed).dimmed()),
            }
        }
        Ok(())
    }

    fn show_help(&self) {
        println!("\n{}", "Available Commands:".bold());
        println!("\n  {}", "Meta-commands:".cyan());
        println!("    .help              Show this help message");
        println!("    .exit, .quit       Exit the shell");
        println!("    .tables            List domains in the store");
        println!("    .format <type>     Set output format (table|json)");
        println!("    .timer <on|off>    Toggle statement timing display");
        println!("    .save [path]       Write the store to a JSON snapshot");
        println!("    .clear             Clear the screen");

        println!("\n  {}", "Statements:".cyan());
        println!("    create table users;");
        println!("    insert into users (id, name) values ('ID1', 'Alice');");
        println!("    select id, name from users where id = 'ID1';");
        println!("    select id, name from users where name like 'A%' order by name;");
        println!("    update users set name = 'Bob' where id = 'ID1';");
        println!("    delete from users where id = 'ID1';");
        println!("\n  Statements continue across lines until a {}.", ";".bold());
        println!();
    }

    fn show_tables(&self) {
        let domains = self.session.store.domain_names();
        if domains.is_empty() {
            println!("No domains");
            return;
        }
        for domain in domains {
            let count = self.session.store.item_count(&domain).unwrap_or(0);
            println!("  {} {}", domain.cyan(), format!("({} items)", count).dimmed());
        }
    }

    fn set_format(&mut self, format: &str) {
        self.format = match format.to_lowercase().as_str() {
            "table" => OutputFormat::Table,
            "json" => OutputFormat::Json,
            _ => {
                println!("{} {}. Use: table or json", "Invalid format:".red(), format);
                return;
            }
        };
        println!("Output format set to: {:?}", self.format);
    }

    fn set_timer(&mut self, value: &str) {
        self.show_timing = match value.to_lowercase().as_str() {
            "on" | "true" | "1" => true,
            "off" | "false" | "0" => false,
            _ => {
                println!("{} {}. Use: on or off", "Invalid value:".red(), value);
                return;
            }
        };
        println!("Timer {}", if self.show_timing { "enabled" } else { "disabled" });
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", format!("sdbsql shell v{}", env!("CARGO_PKG_VERSION")).cyan().bold());
        match &self.session.snapshot {
            Some(path) => println!("  Snapshot: {}", path.display()),
            None => println!(
                "  {} In-memory store; use .save <path> to keep data.",
                "Note:".yellow().bold()
            ),
        }
        println!("  Type {} for commands. End statements with {}.", ".help".bold(), ";".bold());
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_query() {
        assert!(is_query("select a from t"));
        assert!(is_query("  SELECT id from t"));
        assert!(is_query("consistent select a from t where id = 'k'"));
        assert!(is_query("-- note\nselect a from t"));
        assert!(!is_query("insert into t (id) values ('k')"));
        assert!(!is_query("upsert t set a = 'x' where id = 'k'"));
        assert!(!is_query("selec a from t"));
        assert!(!is_query(""));
    }

    #[test]
    fn test_keyword_candidates() {
        let pairs = SqlCompleter::candidates(KEYWORDS, "SEL");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].replacement, "select");

        let pairs = SqlCompleter::candidates(META_COMMANDS, ".t");
        let names: Vec<_> = pairs.iter().map(|p| p.replacement.as_str()).collect();
        assert_eq!(names, vec![".tables", ".timer"]);
    }
}
