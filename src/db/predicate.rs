//! WHERE-clause expression tree.
//!
//! A [`Predicate`] is immutable once built. The executor renders it into
//! `$n` placeholders (only when a statement shape is first cached) and binds
//! its values in the same left-to-right order.

use super::DbError;
use super::value::{Value, check_identifier};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = $n`
    Eq { column: &'static str, value: Value },
    /// `LOWER(column) = LOWER($n)`. Both sides go through the server's
    /// `LOWER()` so they fold identically under any collation.
    EqIgnoreCase { column: &'static str, value: String },
    /// `column LIKE $n` or `LOWER(column) LIKE LOWER($n)`.
    Like {
        column: &'static str,
        pattern: String,
        ignore_case: bool,
    },
    /// Conjunction; never nested (see [`Predicate::and`]).
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn equal_to(column: &'static str, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            column,
            value: value.into(),
        }
    }

    pub fn equal_to_ignore_case(column: &'static str, value: &str) -> Self {
        Predicate::EqIgnoreCase {
            column,
            value: value.to_string(),
        }
    }

    pub fn like(column: &'static str, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            column,
            pattern: pattern.into(),
            ignore_case: false,
        }
    }

    pub fn like_ignore_case(column: &'static str, pattern: &str) -> Self {
        Predicate::Like {
            column,
            pattern: pattern.to_string(),
            ignore_case: true,
        }
    }

    /// Chain another condition. Conjunctions are flattened so the rendered
    /// clause is a flat `a AND b AND c`.
    pub fn and(self, other: Predicate) -> Self {
        let mut terms = match self {
            Predicate::And(terms) => terms,
            single => vec![single],
        };
        match other {
            Predicate::And(more) => terms.extend(more),
            single => terms.push(single),
        }
        Predicate::And(terms)
    }

    /// Number of values this predicate binds.
    pub fn param_count(&self) -> usize {
        match self {
            Predicate::And(terms) => terms.iter().map(Predicate::param_count).sum(),
            _ => 1,
        }
    }

    /// Append the clause text (without `WHERE`) to `sql`, numbering
    /// placeholders from `*next` onward.
    pub(crate) fn render(&self, sql: &mut String, next: &mut usize) -> Result<(), DbError> {
        match self {
            Predicate::Eq { column, .. } => {
                sql.push_str(&format!("{} = ${}", check_identifier(column)?, next));
                *next += 1;
            }
            Predicate::EqIgnoreCase { column, .. } => {
                sql.push_str(&format!(
                    "LOWER({}) = LOWER(${})",
                    check_identifier(column)?,
                    next
                ));
                *next += 1;
            }
            Predicate::Like {
                column,
                ignore_case,
                ..
            } => {
                let column = check_identifier(column)?;
                if *ignore_case {
                    sql.push_str(&format!("LOWER({}) LIKE LOWER(${})", column, next));
                } else {
                    sql.push_str(&format!("{} LIKE ${}", column, next));
                }
                *next += 1;
            }
            Predicate::And(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    term.render(sql, next)?;
                }
            }
        }
        Ok(())
    }

    /// Consume the predicate, appending its values in placeholder order.
    pub(crate) fn collect_values(self, out: &mut Vec<Value>) {
        match self {
            Predicate::Eq { value, .. } => out.push(value),
            Predicate::EqIgnoreCase { value, .. } => out.push(Value::Text(value)),
            Predicate::Like { pattern, .. } => out.push(Value::Text(pattern)),
            Predicate::And(terms) => {
                for term in terms {
                    term.collect_values(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(predicate: &Predicate, first: usize) -> String {
        let mut sql = String::new();
        let mut next = first;
        predicate.render(&mut sql, &mut next).unwrap();
        sql
    }

    #[test]
    fn test_equal_to_binds_value_not_text() {
        let p = Predicate::equal_to("username", "alice'; --");
        assert_eq!(rendered(&p, 1), "username = $1");

        let mut values = Vec::new();
        p.collect_values(&mut values);
        assert_eq!(values, vec![Value::Text("alice'; --".into())]);
    }

    #[test]
    fn test_and_flattens_and_numbers_in_order() {
        let p = Predicate::equal_to("id", "u1")
            .and(Predicate::equal_to("access_token", "tok"))
            .and(Predicate::equal_to("is_verify", true));
        assert_eq!(
            rendered(&p, 1),
            "id = $1 AND access_token = $2 AND is_verify = $3"
        );
        assert_eq!(p.param_count(), 3);
        assert!(matches!(&p, Predicate::And(terms) if terms.len() == 3));

        let mut values = Vec::new();
        p.collect_values(&mut values);
        assert_eq!(
            values,
            vec![
                Value::Text("u1".into()),
                Value::Text("tok".into()),
                Value::Bool(true)
            ]
        );
    }

    #[test]
    fn test_placeholders_continue_after_set_clause() {
        let p = Predicate::equal_to("id", "u1");
        assert_eq!(rendered(&p, 3), "id = $3");
    }

    #[test]
    fn test_ignore_case_lowers_both_sides_on_the_server() {
        let p = Predicate::equal_to_ignore_case("character_name", "ÄRGER");
        assert_eq!(rendered(&p, 1), "LOWER(character_name) = LOWER($1)");
        let mut values = Vec::new();
        p.collect_values(&mut values);
        assert_eq!(values, vec![Value::Text("ÄRGER".into())]);

        let like = Predicate::like_ignore_case("email", "Alice@Example.COM");
        assert_eq!(rendered(&like, 2), "LOWER(email) LIKE LOWER($2)");
        let mut values = Vec::new();
        like.collect_values(&mut values);
        assert_eq!(values, vec![Value::Text("Alice@Example.COM".into())]);
    }

    #[test]
    fn test_case_variants_share_one_shape() {
        let a = Predicate::equal_to_ignore_case("character_name", "bob");
        let b = Predicate::equal_to_ignore_case("character_name", "BOB");
        assert_eq!(rendered(&a, 1), rendered(&b, 1));
        assert_eq!(a.param_count(), b.param_count());
    }

    #[test]
    fn test_bad_column_is_rejected() {
        let p = Predicate::equal_to("id OR 1=1", "x");
        let mut sql = String::new();
        let mut next = 1;
        assert!(matches!(
            p.render(&mut sql, &mut next),
            Err(DbError::InvalidIdentifier(_))
        ));
    }
}
