//! Fixed vocabularies of the query language.
//!
//! Every stage reads these tables; none of them mutate. Their order is the
//! canonical order used by autocomplete.

/// Logical field names understood by the query language.
pub const FIELDS: &[&str] = &[
    "project",
    "type",
    "status",
    "priority",
    "assignee",
    "reporter",
    "created",
    "updated",
    "resolved",
    "due",
    "summary",
    "description",
    "key",
    "storyPoints",
    "sprint",
    "epic",
    "parent",
    "labels",
    "text",
];

pub const OPERATORS: &[&str] = &[
    "=", "!=", ">", "<", ">=", "<=", "~", "!~", "IN", "NOT IN", "IS", "IS NOT", "WAS", "CHANGED",
];

/// Function-call literals as they are offered to the user.
pub const FUNCTIONS: &[&str] = &[
    "currentUser()",
    "now()",
    "startOfDay()",
    "endOfDay()",
    "startOfWeek()",
    "endOfWeek()",
    "startOfMonth()",
    "endOfMonth()",
];

pub const KEYWORDS: &[&str] = &["AND", "OR", "NOT", "ORDER BY", "ASC", "DESC"];

/// Returns the canonical spelling of a field, matching case-insensitively.
pub fn canonical_field(name: &str) -> Option<&'static str> {
    FIELDS
        .iter()
        .copied()
        .find(|field| field.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_field() {
        assert_eq!(canonical_field("StoryPoints"), Some("storyPoints"));
        assert_eq!(canonical_field("STATUS"), Some("status"));
        assert_eq!(canonical_field("velocity"), None);
    }
}
