use anyhow::{Context as _, Result};
use clap::Parser as ClapParser;
use issue_query::completion::{partial_token, suggest};
use issue_query::lexer::tokenize;
use issue_query::parser::Parser;
use issue_query::{ExecutionContext, FieldMapping, MemoryStore, QueryEngine};
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator as LineValidator;
use rustyline::{Editor, Helper};
use sea_query::PostgresQueryBuilder;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser, Debug)]
#[command(name = "issue-query")]
#[command(about = "Interactive structured issue query shell")]
struct Args {
    /// Field mapping JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON array of issues to query
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// User that currentUser() resolves to
    #[arg(short, long, default_value = "me")]
    user: String,
}

/// Tab completion backed by the query vocabulary
struct QueryHelper;

impl Completer for QueryHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let (start, _) = partial_token(line, pos);
        Ok((start, suggest(line, pos)))
    }
}

impl Hinter for QueryHelper {
    type Hint = String;
}

impl Highlighter for QueryHelper {}

impl LineValidator for QueryHelper {}

impl Helper for QueryHelper {}

fn load_mapping(path: Option<&PathBuf>) -> FieldMapping {
    let Some(path) = path else {
        return FieldMapping::default();
    };
    match FieldMapping::from_json_file(path) {
        Ok(mapping) => {
            info!(path = %path.display(), fields = mapping.fields.len(), "loaded field mapping");
            mapping
        }
        Err(e) => {
            warn!("无法加载字段映射 ({}), 使用默认配置", e);
            FieldMapping::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let engine = QueryEngine::new(load_mapping(args.config.as_ref()));
    let store = match &args.data {
        Some(path) => MemoryStore::from_json_file(path)
            .with_context(|| format!("failed to load issues from {}", path.display()))?,
        None => MemoryStore::default(),
    };
    info!(issues = store.len(), user = %args.user, "issue query shell ready");

    let mut editor: Editor<QueryHelper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(QueryHelper));

    loop {
        let line = match editor.readline("query> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }
        if raw == "exit" {
            break;
        }
        editor.add_history_entry(raw)?;

        run_query(&engine, &store, raw, &args.user);
    }

    Ok(())
}

fn run_query(engine: &QueryEngine, store: &MemoryStore, raw: &str, user: &str) {
    let validation = engine.validate(raw);
    if !validation.valid {
        for error in &validation.errors {
            println!("✗ {}", error);
        }
        return;
    }

    let tokens = tokenize(raw);
    let mut parser = Parser::new(&tokens);
    let query = parser.parse();
    for error in parser.errors() {
        match error.span {
            Some(span) => println!("⚠️ {} (位置 {}-{})", error.message, span.start, span.end),
            None => println!("⚠️ {}", error.message),
        }
    }
    println!("{}", query);

    let context = ExecutionContext::for_user(user);
    let compiled = engine.executor().execute(&query, &context);
    let (sql, values) = compiled.build(engine.executor().mapping().table(), PostgresQueryBuilder);
    println!("{}", sql);
    if !values.0.is_empty() {
        println!("参数: {:?}", values.0);
    }

    match engine.fetch(store, raw, &context) {
        Ok(issues) => {
            for issue in &issues {
                match serde_json::to_string(issue) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("无法序列化记录: {}", e),
                }
            }
            println!("✅ {} 条记录", issues.len());
        }
        Err(e) => println!("✗ 查询失败: {}", e),
    }
}
