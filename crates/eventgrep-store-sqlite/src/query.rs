//! Translation of search criteria into SQL predicates

use chrono::{DateTime, Utc};
use eventgrep_core::{Criteria, FilterSet, SearchQuery};
use sqlx::{QueryBuilder, Sqlite};

pub(crate) const MESSAGE_COLUMNS: &str =
    "m.id, m.msg_id, m.timestamp_us, m.topic, m.category, m.summary, m.body";

/// Append `WHERE ...` for the window, every filter set and the substring terms.
///
/// Dimensions are AND-ed. Within a dimension the include list is an `IN`
/// (any of) and the exclude list a `NOT IN`, so exclusion wins whenever a
/// value appears in both.
pub(crate) fn push_criteria(qb: &mut QueryBuilder<'_, Sqlite>, criteria: &Criteria) {
    qb.push(" WHERE 1 = 1");

    // Stored times are whole microseconds, so rounding both bounds up keeps
    // `t >= start` and `t < end` exact
    if let Some(start) = criteria.window.start {
        qb.push(" AND m.timestamp_us >= ")
            .push_bind(ceil_micros(start));
    }
    if let Some(end) = criteria.window.end {
        qb.push(" AND m.timestamp_us < ").push_bind(ceil_micros(end));
    }

    let filters = &criteria.filters;
    push_column_filter(qb, "m.category", &filters.categories);
    push_column_filter(qb, "m.topic", &filters.topics);
    push_related_filter(qb, "message_users", "username", &filters.users);
    push_related_filter(qb, "message_packages", "package", &filters.packages);

    if !criteria.contains.is_empty() {
        qb.push(" AND (");
        for (i, term) in criteria.contains.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            let pattern = like_pattern(term);
            qb.push("m.summary LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR m.body_text LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\'");
        }
        qb.push(")");
    }
}

/// Microseconds since the epoch, rounded toward the future.
pub(crate) fn ceil_micros(instant: DateTime<Utc>) -> i64 {
    let micros = instant.timestamp_micros();
    if instant.timestamp_subsec_nanos() % 1_000 != 0 {
        micros.saturating_add(1)
    } else {
        micros
    }
}

/// `ORDER BY` plus `LIMIT`/`OFFSET` for one page.
pub(crate) fn push_page(qb: &mut QueryBuilder<'_, Sqlite>, query: &SearchQuery) {
    qb.push(" ORDER BY m.timestamp_us ")
        .push(query.order.as_sql())
        .push(", m.msg_id ASC LIMIT ")
        .push_bind(i64::from(query.rows_per_page))
        .push(" OFFSET ")
        .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
}

fn push_column_filter(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, set: &FilterSet) {
    if !set.include.is_empty() {
        qb.push(format!(" AND {} IN (", column));
        push_values(qb, set.include.iter());
    }
    if !set.exclude.is_empty() {
        qb.push(format!(" AND {} NOT IN (", column));
        push_values(qb, set.exclude.iter());
    }
}

fn push_related_filter(
    qb: &mut QueryBuilder<'_, Sqlite>,
    table: &str,
    column: &str,
    set: &FilterSet,
) {
    if !set.include.is_empty() {
        qb.push(format!(
            " AND EXISTS (SELECT 1 FROM {table} r WHERE r.message_id = m.id AND r.{column} IN ("
        ));
        push_values(qb, set.include.iter());
        qb.push(")");
    }
    if !set.exclude.is_empty() {
        qb.push(format!(
            " AND NOT EXISTS (SELECT 1 FROM {table} r WHERE r.message_id = m.id AND r.{column} IN ("
        ));
        push_values(qb, set.exclude.iter());
        qb.push(")");
    }
}

/// Bind a comma-separated value list and close the parenthesis.
fn push_values<'a>(qb: &mut QueryBuilder<'_, Sqlite>, values: impl Iterator<Item = &'a String>) {
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(value.clone());
    }
    separated.push_unseparated(")");
}

/// `%term%` with LIKE wildcards in the term escaped by backslash.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
