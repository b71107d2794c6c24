//! Faceted query language (`q` / `fq` / `sort` / `cursorMark`), as spoken by
//! Solr-style engines.

use super::{Page, QueryDialect, SearchQuery, SortClause};

/// Match-all query.
pub const MATCH_ALL: &str = "*:*";

/// Ordered request parameters; keys such as `fq` and `facet.field` repeat.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FacetedQuery {
    pub params: Vec<(String, String)>,
}

impl FacetedQuery {
    fn push(&mut self, key: &str, value: impl Into<String>) {
        self.params.push((key.to_string(), value.into()));
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated `key`, in order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FacetedDialect;

/// Quote a filter value, escaping backslashes and quotes.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn equality_clause(filters: &[(String, String)], joiner: &str) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let clause = filters
        .iter()
        .map(|(field, value)| format!("{field}:{}", quote(value)))
        .collect::<Vec<_>>()
        .join(joiner);
    Some(clause)
}

fn sort_param(clauses: &[SortClause]) -> String {
    clauses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl QueryDialect for FacetedDialect {
    type Request = FacetedQuery;

    fn render(&self, query: &SearchQuery) -> FacetedQuery {
        let spec = &query.spec;
        let mut out = FacetedQuery::default();

        out.push("q", spec.free_text.as_deref().unwrap_or(MATCH_ALL));

        if let Some(clause) = equality_clause(&spec.and_filters, " AND ") {
            out.push("fq", clause);
        }
        if let Some(clause) = equality_clause(&spec.or_filters, " OR ") {
            out.push("fq", clause);
        }
        for (field, range) in &spec.date_range_filters {
            out.push("fq", format!("{field}:{range}"));
        }

        let mut clauses = spec.sort_clauses();
        if matches!(query.page, Page::Cursor { .. })
            && !clauses.iter().any(|c| c.field == spec.primary_key)
        {
            // cursorMark requires the unique key in the sort.
            clauses.push(SortClause::asc(&spec.primary_key));
        }
        out.push("sort", sort_param(&clauses));

        if !spec.field_list.is_empty() {
            out.push("fl", spec.field_list.join(","));
        }

        match &spec.facets {
            Some(facets) => {
                out.push("facet", "on");
                for field in &facets.fields {
                    out.push("facet.field", field.as_str());
                }
                out.push("facet.sort", facets.sort.as_str());
                out.push("facet.mincount", "1");
            }
            None => out.push("facet", "off"),
        }

        match &query.page {
            Page::Offset { offset, limit } => {
                out.push("start", offset.to_string());
                out.push("rows", limit.to_string());
            }
            Page::Cursor { cursor, limit } => {
                out.push("cursorMark", cursor.as_str());
                out.push("rows", limit.to_string());
            }
        }

        out.push("wt", "json");
        out
    }
}
