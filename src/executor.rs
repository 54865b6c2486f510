//! Query executor that turns a structured query into a backing-store predicate.
//!
//! The executor resolves deferred functions against the execution context on
//! every call, maps logical fields through the field mapping and folds the
//! clauses of each level strictly left to right. It performs no validation:
//! callers accepting untrusted text should run the validator first.

use crate::ast::{Clause, Combinator, Condition, ConditionValue, Operator, StructuredQuery, Term};
use crate::config::FieldMapping;
use crate::predicate::{Comparison, CompiledQuery, Predicate, SortKey};
use crate::resolver::{resolve, ExecutionContext, Value};
use crate::store::{IssueStore, StoreError};
use sea_query::PostgresQueryBuilder;
use tracing::{debug, Level};

/// Compiles structured queries against a field mapping
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    mapping: FieldMapping,
}

impl QueryExecutor {
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Compile a structured query into a predicate and sort directive
    pub fn execute(&self, query: &StructuredQuery, context: &ExecutionContext) -> CompiledQuery {
        let predicate = self.compile_clauses(&query.clauses, context);

        let order = query
            .order_by
            .iter()
            .map(|spec| SortKey {
                column: self.mapping.accessor(&spec.field).primary_column().to_string(),
                direction: spec.direction,
            })
            .collect();

        CompiledQuery { predicate, order }
    }

    /// Compile and run the query with a single call into the backing store.
    /// Store failures are returned unchanged.
    pub fn fetch<S: IssueStore>(
        &self,
        store: &S,
        query: &StructuredQuery,
        context: &ExecutionContext,
    ) -> Result<Vec<S::Record>, StoreError> {
        let compiled = self.execute(query, context);
        if tracing::enabled!(Level::DEBUG) {
            let (sql, values) = compiled.build(self.mapping.table(), PostgresQueryBuilder);
            debug!(%sql, parameters = values.0.len(), "fetching issues");
        }
        store.fetch(&compiled)
    }

    /// Fold the clauses of one nesting level left to right
    fn compile_clauses(&self, clauses: &[Clause], context: &ExecutionContext) -> Predicate {
        let mut combined: Option<Predicate> = None;

        for clause in clauses {
            let mut predicate = match &clause.term {
                Term::Condition(condition) => self.compile_condition(condition, context),
                Term::Group(inner) => {
                    Predicate::Group(Box::new(self.compile_clauses(inner, context)))
                }
            };
            if clause.negated {
                predicate = Predicate::Not(Box::new(predicate));
            }

            // The first clause's combinator has nothing to its left
            combined = Some(match combined {
                None => predicate,
                Some(left) => match clause.combinator {
                    Combinator::And => Predicate::And(Box::new(left), Box::new(predicate)),
                    Combinator::Or => Predicate::Or(Box::new(left), Box::new(predicate)),
                },
            });
        }

        combined.unwrap_or(Predicate::Always)
    }

    /// Compile a single condition, one leaf per mapped column
    fn compile_condition(&self, condition: &Condition, context: &ExecutionContext) -> Predicate {
        let values: Vec<Value> = match &condition.value {
            ConditionValue::Single(operand) => vec![resolve(operand, context)],
            ConditionValue::List(operands) => {
                operands.iter().map(|operand| resolve(operand, context)).collect()
            }
            ConditionValue::None => Vec::new(),
        };

        let accessor = self.mapping.accessor(&condition.field);
        let mut leaves: Vec<Predicate> = accessor
            .columns()
            .iter()
            .map(|column| compile_leaf(column, condition.operator, &values))
            .collect();

        if leaves.len() == 1 {
            leaves.remove(0)
        } else if condition.operator.is_negative() {
            Predicate::All(leaves)
        } else {
            Predicate::Any(leaves)
        }
    }
}

/// Translate one operator against one column
fn compile_leaf(column: &str, operator: Operator, values: &[Value]) -> Predicate {
    let scalar = || values.first().cloned().unwrap_or(Value::Null);
    let compare = |op: Comparison| Predicate::Compare {
        column: column.to_string(),
        op,
        value: scalar(),
    };

    match operator {
        Operator::Eq | Operator::Is => equality(column, scalar(), false),
        Operator::NotEq | Operator::IsNot => equality(column, scalar(), true),
        Operator::Was => {
            // no change history: match the current value
            debug!(column, "WAS approximated as equality");
            equality(column, scalar(), false)
        }
        Operator::Gt => compare(Comparison::Gt),
        Operator::Lt => compare(Comparison::Lt),
        Operator::Gte => compare(Comparison::Gte),
        Operator::Lte => compare(Comparison::Lte),
        Operator::In | Operator::NotIn => Predicate::InList {
            column: column.to_string(),
            values: values.to_vec(),
            negated: operator == Operator::NotIn,
        },
        Operator::Like | Operator::NotLike => Predicate::Contains {
            column: column.to_string(),
            needle: scalar().as_text(),
            negated: operator == Operator::NotLike,
        },
        Operator::Changed => {
            debug!(column, "CHANGED approximated as not null");
            Predicate::IsNull {
                column: column.to_string(),
                negated: true,
            }
        }
    }
}

/// `NULL` becomes a null check and `EMPTY` an empty-string comparison
fn equality(column: &str, value: Value, negated: bool) -> Predicate {
    let op = if negated { Comparison::NotEq } else { Comparison::Eq };
    match value {
        Value::Null => Predicate::IsNull {
            column: column.to_string(),
            negated,
        },
        Value::Empty => Predicate::Compare {
            column: column.to_string(),
            op,
            value: Value::Text(String::new()),
        },
        value => Predicate::Compare {
            column: column.to_string(),
            op,
            value,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Direction;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn parse_string(input: &str) -> StructuredQuery {
        let tokens: Vec<_> = Lexer::new(input).collect();
        Parser::new(&tokens).parse()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
    }

    fn context(user: &str) -> ExecutionContext {
        ExecutionContext::new(user, now())
    }

    fn text_eq(column: &str, value: &str) -> Predicate {
        Predicate::Compare {
            column: column.to_string(),
            op: Comparison::Eq,
            value: Value::Text(value.to_string()),
        }
    }

    #[test]
    fn test_conditions_and_order() {
        let executor = QueryExecutor::default();
        let query = parse_string(
            r#"status = "Done" AND priority IN ("High","Highest") ORDER BY updated DESC"#,
        );
        let compiled = executor.execute(&query, &context("alice"));

        assert_eq!(
            compiled.predicate,
            Predicate::And(
                Box::new(text_eq("status", "Done")),
                Box::new(Predicate::InList {
                    column: "priority".to_string(),
                    values: vec![
                        Value::Text("High".to_string()),
                        Value::Text("Highest".to_string())
                    ],
                    negated: false,
                }),
            )
        );
        assert_eq!(
            compiled.order,
            vec![SortKey { column: "updated_at".to_string(), direction: Direction::Desc }]
        );
    }

    #[test]
    fn test_group_is_wrapped() {
        let executor = QueryExecutor::default();
        let query =
            parse_string(r#"(status = "Done" OR status = "Closed") AND assignee = currentUser()"#);
        let compiled = executor.execute(&query, &context("alice"));

        assert_eq!(
            compiled.predicate,
            Predicate::And(
                Box::new(Predicate::Group(Box::new(Predicate::Or(
                    Box::new(text_eq("status", "Done")),
                    Box::new(text_eq("status", "Closed")),
                )))),
                Box::new(text_eq("assignee_id", "alice")),
            )
        );
    }

    #[test]
    fn test_deferred_current_user() {
        let executor = QueryExecutor::default();
        let query = parse_string("assignee = currentUser()");

        let alice = executor.execute(&query, &context("alice"));
        let bob = executor.execute(&query, &context("bob"));
        assert_ne!(alice, bob);
        assert_eq!(bob.predicate, text_eq("assignee_id", "bob"));
    }

    #[test]
    fn test_execution_is_idempotent() {
        let executor = QueryExecutor::default();
        let query = parse_string("created >= -7d AND due <= endOfWeek() ORDER BY key");
        let ctx = context("alice");
        assert_eq!(executor.execute(&query, &ctx), executor.execute(&query, &ctx));
    }

    #[test]
    fn test_relative_date_resolved_at_execution() {
        let executor = QueryExecutor::default();
        let query = parse_string("created >= -7d");
        let compiled = executor.execute(&query, &context("alice"));
        assert_eq!(
            compiled.predicate,
            Predicate::Compare {
                column: "created_at".to_string(),
                op: Comparison::Gte,
                value: Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap()),
            }
        );
    }

    #[test]
    fn test_text_search_spans_summary_and_description() {
        let executor = QueryExecutor::default();
        let compiled =
            executor.execute(&parse_string(r#"text ~ "login error""#), &context("alice"));
        let contains = |column: &str| Predicate::Contains {
            column: column.to_string(),
            needle: "login error".to_string(),
            negated: false,
        };
        assert_eq!(
            compiled.predicate,
            Predicate::Any(vec![contains("summary"), contains("description")])
        );

        let negative = executor.execute(&parse_string(r#"text !~ "flaky""#), &context("alice"));
        assert!(matches!(negative.predicate, Predicate::All(ref leaves) if leaves.len() == 2));
    }

    #[test]
    fn test_null_empty_and_history_operators() {
        let executor = QueryExecutor::default();
        let query = parse_string(
            "resolved IS NULL AND due IS NOT EMPTY AND status WAS Open AND priority CHANGED",
        );
        let compiled = executor.execute(&query, &context("alice"));

        let Predicate::And(rest, changed) = compiled.predicate else {
            panic!("Expected AND");
        };
        assert_eq!(
            *changed,
            Predicate::IsNull { column: "priority".to_string(), negated: true }
        );
        let Predicate::And(rest, was) = *rest else {
            panic!("Expected AND");
        };
        assert_eq!(*was, text_eq("status", "Open"));
        let Predicate::And(is_null, not_empty) = *rest else {
            panic!("Expected AND");
        };
        assert_eq!(
            *is_null,
            Predicate::IsNull { column: "resolved_at".to_string(), negated: false }
        );
        assert_eq!(
            *not_empty,
            Predicate::Compare {
                column: "due_date".to_string(),
                op: Comparison::NotEq,
                value: Value::Text(String::new()),
            }
        );
    }

    #[test]
    fn test_left_to_right_without_precedence() {
        let executor = QueryExecutor::default();
        let query = parse_string("status = Open OR status = Reopened AND assignee = bob");
        let compiled = executor.execute(&query, &context("alice"));

        // ((Open OR Reopened) AND bob), not (Open OR (Reopened AND bob))
        assert_eq!(
            compiled.predicate,
            Predicate::And(
                Box::new(Predicate::Or(
                    Box::new(text_eq("status", "Open")),
                    Box::new(text_eq("status", "Reopened")),
                )),
                Box::new(text_eq("assignee_id", "bob")),
            )
        );
    }

    #[test]
    fn test_negation_and_unknown_field() {
        let executor = QueryExecutor::default();
        let compiled = executor.execute(&parse_string("NOT velocity > 10"), &context("alice"));
        assert_eq!(
            compiled.predicate,
            Predicate::Not(Box::new(Predicate::Compare {
                column: "velocity".to_string(),
                op: Comparison::Gt,
                value: Value::Integer(10),
            }))
        );
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let executor = QueryExecutor::default();
        let compiled = executor.execute(&parse_string("ORDER BY created"), &context("alice"));
        assert_eq!(compiled.predicate, Predicate::Always);
        assert_eq!(compiled.order.len(), 1);
    }

    #[test]
    fn test_sql_uses_parameters() {
        let executor = QueryExecutor::default();
        let compiled = executor.execute(
            &parse_string(r#"summary ~ "x' OR 1=1 --" AND assignee = currentUser()"#),
            &context("alice"),
        );
        let (sql, values) = compiled.build(executor.mapping().table(), PostgresQueryBuilder);
        assert!(!sql.contains("1=1"), "{sql}");
        assert!(!sql.contains("alice"), "{sql}");
        assert_eq!(values.0.len(), 2);
    }

    struct FailingStore;

    impl IssueStore for FailingStore {
        type Record = ();

        fn fetch(&self, _query: &CompiledQuery) -> Result<Vec<()>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_store_failure_is_surfaced() {
        let executor = QueryExecutor::default();
        let query = parse_string("status = Open");
        let result = executor.fetch(&FailingStore, &query, &context("alice"));
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_fetch_from_memory_store() {
        let store = MemoryStore::new(vec![
            serde_json::json!({"issue_key": "WEB-1", "status": "Open", "assignee_id": "alice"}),
            serde_json::json!({"issue_key": "WEB-2", "status": "Done", "assignee_id": "alice"}),
            serde_json::json!({"issue_key": "WEB-3", "status": "Open", "assignee_id": "bob"}),
        ]
        .into_iter()
        .filter_map(|issue| issue.as_object().cloned())
        .collect());

        let executor = QueryExecutor::default();
        let query = parse_string("status = Open AND assignee = currentUser() ORDER BY key DESC");
        let issues = executor.fetch(&store, &query, &context("bob")).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["issue_key"], "WEB-3");
    }
}
