//! SQL for list queries.
//!
//! A [`Predicate`] compiles to one WHERE clause that both the page query and
//! the count query embed, so the two can never disagree on membership.

use domain::criteria::{Condition, Operator, Scalar};
use domain::query::{ListQuery, Predicate, Scope, SortKey};
use sqlx::{QueryBuilder, Sqlite};

use crate::models::DOCUMENT_COLUMNS;

/// Where a field lives: a real column or a JSON path into `body`.
enum FieldRef {
    Column(&'static str),
    Body(String),
}

fn resolve(field: &str) -> FieldRef {
    match field {
        "id" => FieldRef::Column("id"),
        "createdAt" => FieldRef::Column("created_at"),
        "updatedAt" => FieldRef::Column("updated_at"),
        "tombstonedAt" => FieldRef::Column("tombstoned_at"),
        other => FieldRef::Body(format!("$.{}", other)),
    }
}

fn push_scalar(qb: &mut QueryBuilder<'_, Sqlite>, value: &Scalar) {
    match value {
        Scalar::Text(s) => qb.push_bind(s.clone()),
        Scalar::Number { value, .. } => qb.push_bind(*value),
        Scalar::Bool(b) => qb.push_bind(i64::from(*b)),
    };
}

/// `(typed, literal, ...)`: a stored `"2024"` only equals the literal, a
/// stored `2024` only equals the number.
fn push_match_list(qb: &mut QueryBuilder<'_, Sqlite>, values: &[Scalar]) {
    qb.push("(");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_scalar(qb, value);
        if !matches!(value, Scalar::Text(_)) {
            qb.push(", ");
            qb.push_bind(value.literal());
        }
    }
    qb.push(")");
}

fn push_extract(qb: &mut QueryBuilder<'_, Sqlite>, field: &FieldRef) {
    match field {
        FieldRef::Column(col) => {
            qb.push(*col);
        }
        FieldRef::Body(path) => {
            qb.push("json_extract(documents.body, ");
            qb.push_bind(path.clone());
            qb.push(")");
        }
    }
}

fn comparison(op: Operator) -> &'static str {
    match op {
        Operator::Gt => " > ",
        Operator::Gte => " >= ",
        Operator::Lt => " < ",
        Operator::Lte => " <= ",
        Operator::Eq | Operator::In | Operator::IsNull => " = ",
    }
}

fn push_condition(qb: &mut QueryBuilder<'_, Sqlite>, cond: &Condition) {
    let field = resolve(&cond.field);
    match (cond.op, &field) {
        (Operator::IsNull, _) => {
            push_extract(qb, &field);
            qb.push(" IS NULL");
        }
        // body fields may hold arrays: membership matches any element
        (Operator::Eq | Operator::In, FieldRef::Body(path)) => {
            qb.push("EXISTS (SELECT 1 FROM json_each(documents.body, ");
            qb.push_bind(path.clone());
            qb.push(") WHERE json_each.value IN ");
            push_match_list(qb, &cond.values);
            qb.push(")");
        }
        (Operator::Eq | Operator::In, FieldRef::Column(col)) => {
            qb.push(*col);
            qb.push(" IN ");
            push_match_list(qb, &cond.values);
        }
        (op, _) => {
            push_extract(qb, &field);
            qb.push(comparison(op));
            if let Some(value) = cond.values.first() {
                push_scalar(qb, value);
            }
        }
    }
}

/// `WHERE ...` shared by the page and count queries.
pub fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate) {
    qb.push(" WHERE documents.collection = ");
    qb.push_bind(predicate.collection.as_str());
    qb.push(match predicate.scope {
        Scope::Active => " AND documents.tombstoned_at IS NULL",
        Scope::Tombstoned => " AND documents.tombstoned_at IS NOT NULL",
    });

    for cond in &predicate.conditions {
        qb.push(" AND ");
        push_condition(qb, cond);
    }

    let fields = predicate.collection.text_fields();
    if !predicate.search_terms.is_empty() && !fields.is_empty() {
        qb.push(" AND (");
        let mut first = true;
        for term in &predicate.search_terms {
            for field in fields {
                if !first {
                    qb.push(" OR ");
                }
                first = false;
                qb.push("instr(lower(json_extract(documents.body, ");
                qb.push_bind(format!("$.{}", field));
                qb.push(")), lower(");
                qb.push_bind(term.clone());
                qb.push(")) > 0");
            }
        }
        qb.push(")");
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, sort: &[SortKey]) {
    qb.push(" ORDER BY ");
    for key in sort {
        push_extract(qb, &resolve(&key.field));
        qb.push(if key.descending { " DESC, " } else { " ASC, " });
    }
    // ties fall back to id so consecutive pages never overlap
    qb.push("documents.id ASC");
}

pub fn page_query(query: &ListQuery) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM documents", DOCUMENT_COLUMNS));
    push_predicate(&mut qb, &query.predicate);
    push_order(&mut qb, &query.sort);
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(query.pagination.limit));
    qb.push(" OFFSET ");
    qb.push_bind(i64::try_from(query.pagination.offset()).unwrap_or(i64::MAX));
    qb
}

pub fn count_query(predicate: &Predicate) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM documents");
    push_predicate(&mut qb, predicate);
    qb
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::criteria::QueryParams;
    use domain::Collection;

    fn list(pairs: &[(&str, &str)]) -> ListQuery {
        ListQuery::from_params(
            Collection::Articles,
            Scope::Active,
            &QueryParams::from_pairs(pairs.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn test_count_sql_is_the_page_sql_without_order_and_limit() {
        let query = list(&[("search", "rust"), ("views[gte]", "3"), ("sort", "title")]);
        let page = page_query(&query).into_sql();
        let count = count_query(&query.counting()).into_sql();

        let (page_head, _) = page.split_once(" ORDER BY ").unwrap();
        let (_, page_where) = page_head.split_once(" WHERE ").unwrap();
        let (_, count_where) = count.split_once(" WHERE ").unwrap();
        assert_eq!(page_where, count_where);
        assert!(count.starts_with("SELECT COUNT(*)"));
    }

    #[test]
    fn test_fields_never_reach_sql_text() {
        let query = list(&[("title", "x"), ("sort", "-views")]);
        let sql = page_query(&query).into_sql();
        assert!(!sql.contains("title"));
        assert!(!sql.contains("views"));
        assert!(sql.contains("ORDER BY json_extract(documents.body, ?) DESC, documents.id ASC"));
    }

    #[test]
    fn test_column_fields_use_columns() {
        let query = list(&[("createdAt[lt]", "2030-01-01"), ("sort", "createdAt")]);
        let sql = page_query(&query).into_sql();
        assert!(sql.contains("created_at < ?"));
        assert!(sql.contains("ORDER BY created_at ASC"));
    }

    #[test]
    fn test_numeric_literals_also_match_as_text() {
        let query = list(&[("slug", "2024"), ("title", "plain")]);
        let sql = page_query(&query).into_sql();
        assert!(sql.contains("json_each.value IN (?, ?)"));
        assert!(sql.contains("json_each.value IN (?)"));
    }
}
