//! Helper functions for relationship operations.

use crate::query::sql::{qualified, Fragment};

/// Column-to-column equality: `"from"."col" = "to"."col"`
///
/// Both sides are quoted identifiers, so entity and field names can never
/// break out of the condition.
pub fn join_condition(
    from_alias: &str,
    from_column: &str,
    to_alias: &str,
    to_column: &str,
) -> Fragment {
    Fragment::new(format!(
        "{} = {}",
        qualified(from_alias, from_column),
        qualified(to_alias, to_column)
    ))
}

/// Foreign-key column name for a reference: `users` -> `users_id`
pub fn foreign_key_name(reference: &str) -> String {
    format!("{reference}_id")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_condition() {
        let condition = join_condition("posts", "users_id", "users", "id");
        assert_eq!(condition.sql, "\"posts\".\"users_id\" = \"users\".\"id\"");
        assert!(condition.values.is_empty());
    }

    #[test]
    fn test_join_condition_quotes_identifiers() {
        let condition = join_condition("a\"b", "id", "c", "id");
        assert_eq!(condition.sql, "\"a\"\"b\".\"id\" = \"c\".\"id\"");
    }

    #[test]
    fn test_foreign_key_name() {
        assert_eq!(foreign_key_name("author"), "author_id");
    }
}
