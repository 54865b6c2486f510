//! Structured issue-query language: tokenizer, parser, validator,
//! autocomplete and an executor producing parameterized backing-store queries.
//!
//! ```text
//! raw text ─ tokenize ─▶ tokens ─ parse ─▶ StructuredQuery ─ execute(ctx) ─▶ CompiledQuery ─▶ IssueStore
//!          └ validate ─▶ ValidationResult
//!          └ suggest  ─▶ completions
//! ```

pub mod ast;
pub mod cache;
pub mod completion;
pub mod config;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod predicate;
pub mod resolver;
pub mod store;
pub mod token;
pub mod validator;
pub mod vocabulary;

pub use ast::StructuredQuery;
pub use completion::suggest;
pub use config::{ConfigError, FieldMapping};
pub use executor::QueryExecutor;
pub use lexer::tokenize;
pub use parser::parse;
pub use predicate::CompiledQuery;
pub use resolver::ExecutionContext;
pub use store::{IssueStore, MemoryStore, StoreError};
pub use validator::{validate, ValidationResult};

use cache::QueryCache;
use std::sync::Arc;

/// Tokenize and parse raw query text in one step
pub fn parse_query(raw: &str) -> StructuredQuery {
    parse(&tokenize(raw))
}

/// Parser, validator, autocomplete and executor behind one handle.
///
/// Parsed queries are cached by their raw text; every execution resolves
/// functions such as `currentUser()` against the context it is given.
#[derive(Debug, Default)]
pub struct QueryEngine {
    executor: QueryExecutor,
    cache: QueryCache,
}

impl QueryEngine {
    pub fn new(mapping: FieldMapping) -> Self {
        Self {
            executor: QueryExecutor::new(mapping),
            cache: QueryCache::default(),
        }
    }

    pub fn parse(&self, raw: &str) -> Arc<StructuredQuery> {
        self.cache.get_or_parse(raw)
    }

    pub fn validate(&self, raw: &str) -> ValidationResult {
        validate(raw)
    }

    pub fn suggest(&self, raw: &str, cursor: usize) -> Vec<String> {
        suggest(raw, cursor)
    }

    pub fn execute(&self, raw: &str, context: &ExecutionContext) -> CompiledQuery {
        self.executor.execute(&self.parse(raw), context)
    }

    pub fn fetch<S: IssueStore>(
        &self,
        store: &S,
        raw: &str,
        context: &ExecutionContext,
    ) -> Result<Vec<S::Record>, StoreError> {
        self.executor.fetch(store, &self.parse(raw), context)
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }
}
