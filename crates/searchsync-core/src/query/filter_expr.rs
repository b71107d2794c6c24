//! Filter-expression query language (`filter` string + sortable attributes),
//! as spoken by Meilisearch-style engines.
//!
//! Relevance is implicit in this dialect, so `score` sort clauses are dropped.
//! Range bounds that look like dates are converted to unix seconds, the only
//! comparable form the engine supports.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Page, QueryDialect, SearchQuery};

/// JSON body of a search call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSearch {
    /// Omitted for a placeholder (match-all) search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    pub offset: u64,
    pub limit: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_retrieve: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FilterDialect;

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn equality_group(filters: &[(String, String)], joiner: &str) -> Option<String> {
    match filters {
        [] => None,
        [(field, value)] => Some(format!("{field} = {}", quote(value))),
        _ => {
            let inner = filters
                .iter()
                .map(|(field, value)| format!("{field} = {}", quote(value)))
                .collect::<Vec<_>>()
                .join(joiner);
            Some(format!("({inner})"))
        }
    }
}

/// Render a bound as a comparable literal.
fn bound_literal(bound: &str) -> String {
    if bound.parse::<f64>().is_ok() {
        return bound.to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(bound) {
        return dt.timestamp().to_string();
    }
    if let Ok(d) = NaiveDate::parse_from_str(bound, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return dt.and_utc().timestamp().to_string();
        }
    }
    quote(bound)
}

/// Translate `[from TO to]` (inclusive) or `{from TO to}` (exclusive) into
/// comparisons. Returns `None` when the expression is not a range or both
/// bounds are open.
fn range_clause(field: &str, expr: &str) -> Option<String> {
    let expr = expr.trim();
    let (open, close) = (expr.chars().next()?, expr.chars().last()?);
    let inclusive = match (open, close) {
        ('[', ']') => true,
        ('{', '}') => false,
        _ => return None,
    };
    let body = &expr[1..expr.len() - 1];
    let (from, to) = body.split_once(" TO ")?;
    let (from, to) = (from.trim(), to.trim());

    let (gt, lt) = if inclusive { (">=", "<=") } else { (">", "<") };
    let mut parts = Vec::with_capacity(2);
    if from != "*" {
        parts.push(format!("{field} {gt} {}", bound_literal(from)));
    }
    if to != "*" {
        parts.push(format!("{field} {lt} {}", bound_literal(to)));
    }
    (!parts.is_empty()).then(|| parts.join(" AND "))
}

impl QueryDialect for FilterDialect {
    type Request = FilterSearch;

    fn render(&self, query: &SearchQuery) -> FilterSearch {
        let spec = &query.spec;

        let mut groups = Vec::new();
        groups.extend(equality_group(&spec.and_filters, " AND "));
        groups.extend(equality_group(&spec.or_filters, " OR "));
        for (field, range) in &spec.date_range_filters {
            match range_clause(field, range) {
                Some(clause) => groups.push(clause),
                None => tracing::warn!(field, range, "skipping unparseable range filter"),
            }
        }
        let filter = (!groups.is_empty()).then(|| groups.join(" AND "));

        let sort = spec
            .sort_clauses()
            .into_iter()
            .filter(|c| !c.is_relevance())
            .map(|c| format!("{}:{}", c.field, c.direction.as_str()))
            .collect();

        let (offset, limit) = match &query.page {
            Page::Offset { offset, limit } => (*offset, *limit),
            // The cursor of this dialect is the decimal offset of the next page.
            Page::Cursor { cursor, limit } => (cursor.parse().unwrap_or(0), *limit),
        };

        FilterSearch {
            q: spec.free_text.clone(),
            filter,
            sort,
            offset,
            limit,
            attributes_to_retrieve: spec.field_list.clone(),
            facets: spec
                .facets
                .as_ref()
                .map(|f| f.fields.clone())
                .unwrap_or_default(),
        }
    }
}
