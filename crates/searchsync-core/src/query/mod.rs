//! Query builder — turns a declarative filter/sort/facet/page request into a
//! backend-neutral [`SearchQuery`], which a [`QueryDialect`] renders into the
//! engine's native request.
//!
//! ```text
//! QueryBuilder ──build()──▶ SearchQuery ──render(dialect)──▶ FacetedQuery    (q / fq / sort / cursorMark)
//!                                                       └──▶ FilterSearch    (filter expression / sort attrs)
//! ```

pub mod faceted;
pub mod filter_expr;
pub mod response;

pub use faceted::{FacetedDialect, FacetedQuery};
pub use filter_expr::{FilterDialect, FilterSearch};
pub use response::SearchResponse;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::document::DEFAULT_PRIMARY_KEY;

/// Relevance pseudo-field.
pub const SCORE_FIELD: &str = "score";

/// Rows per page when the caller sets nothing.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One `field direction` sort clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

impl SortClause {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse `-field` (descending) or `field` (ascending).
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        let (field, direction) = match spec.strip_prefix('-') {
            Some(rest) => (rest.trim(), SortDirection::Desc),
            None => (spec, SortDirection::Asc),
        };
        (!field.is_empty()).then(|| Self {
            field: field.to_string(),
            direction,
        })
    }

    pub fn is_relevance(&self) -> bool {
        self.field == SCORE_FIELD
    }
}

impl std::fmt::Display for SortClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field, self.direction.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetSort {
    /// Most frequent values first.
    #[default]
    Count,
    /// Lexicographic by value.
    Index,
}

impl FacetSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Index => "index",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FacetSpec {
    pub fields: Vec<String>,
    pub sort: FacetSort,
}

/// The accumulated query, independent of any engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// `None` means match everything.
    pub free_text: Option<String>,
    /// Equality filters that must all hold.
    pub and_filters: Vec<(String, String)>,
    /// Equality filters of which at least one must hold.
    pub or_filters: Vec<(String, String)>,
    /// `(field, "[from TO to]")` range clauses.
    pub date_range_filters: Vec<(String, String)>,
    pub order: SortClause,
    /// Explicit tie-breaker; the field-dependent default applies when `None`.
    pub tie_breaker: Option<Vec<SortClause>>,
    pub primary_key: String,
    pub field_list: Vec<String>,
    /// Faceting is off when `None`.
    pub facets: Option<FacetSpec>,
    pub offset: u64,
    pub limit: u64,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            free_text: None,
            and_filters: vec![],
            or_filters: vec![],
            date_range_filters: vec![],
            order: SortClause::desc(SCORE_FIELD),
            tie_breaker: None,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            field_list: vec![],
            facets: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QuerySpec {
    /// Tie-breaker clauses in effect for the current ordering.
    ///
    /// Relevance ordering breaks ties by primary key; any other field breaks
    /// ties by relevance, then primary key.
    pub fn effective_tie_breaker(&self) -> Vec<SortClause> {
        match &self.tie_breaker {
            Some(explicit) => explicit.clone(),
            None if self.order.is_relevance() => vec![SortClause::asc(&self.primary_key)],
            None => vec![
                SortClause::desc(SCORE_FIELD),
                SortClause::asc(&self.primary_key),
            ],
        }
    }

    /// Primary clause followed by the tie-breaker, without repeating a field.
    pub fn sort_clauses(&self) -> Vec<SortClause> {
        let mut clauses = vec![self.order.clone()];
        for clause in self.effective_tie_breaker() {
            if !clauses.iter().any(|c| c.field == clause.field) {
                clauses.push(clause);
            }
        }
        clauses
    }
}

/// How a rendered query pages through results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Page {
    Offset { offset: u64, limit: u64 },
    /// Deep pagination with an opaque token; `*` starts from the beginning.
    Cursor { cursor: String, limit: u64 },
}

impl Page {
    pub const CURSOR_START: &'static str = "*";

    pub fn limit(&self) -> u64 {
        match self {
            Self::Offset { limit, .. } | Self::Cursor { limit, .. } => *limit,
        }
    }
}

/// A built query: the accumulated [`QuerySpec`] plus its pagination mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub spec: QuerySpec,
    pub page: Page,
}

impl SearchQuery {
    pub fn render<D: QueryDialect>(&self, dialect: &D) -> D::Request {
        dialect.render(self)
    }
}

/// An engine's native query language.
pub trait QueryDialect {
    type Request;

    fn render(&self, query: &SearchQuery) -> Self::Request;
}

/// Stateful assembler for a [`SearchQuery`]. Filter methods accumulate; the
/// `set_*` methods replace.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    spec: QuerySpec,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `field` instead of `id` for the deterministic tie-breaker.
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.spec.primary_key = field.into();
        self
    }

    /// Blank input means match everything.
    pub fn set_free_text(&mut self, text: &str) -> &mut Self {
        let text = text.trim();
        self.spec.free_text = (!text.is_empty()).then(|| text.to_string());
        self
    }

    pub fn add_and_filters<K, V>(&mut self, filters: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.spec
            .and_filters
            .extend(filters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn add_or_filters<K, V>(&mut self, filters: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.spec
            .or_filters
            .extend(filters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Range expressions use `[from TO to]` syntax with `*` for an open bound.
    pub fn add_date_range_filters<K, V>(
        &mut self,
        filters: impl IntoIterator<Item = (K, V)>,
    ) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.spec
            .date_range_filters
            .extend(filters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Restrict `field` to one calendar year. Anything but a 4-digit year is
    /// ignored.
    pub fn add_year_filter(&mut self, field: &str, year: &str) -> &mut Self {
        let year = year.trim();
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            tracing::debug!(field, year, "ignoring malformed year filter");
            return self;
        }
        let range = format!("[{year}-01-01T00:00:00Z TO {year}-12-31T23:59:59Z]");
        self.add_date_range_filters([(field, range)])
    }

    /// Range on `field` between two optional dates (inclusive).
    pub fn add_date_bounds(
        &mut self,
        field: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> &mut Self {
        if from.is_none() && to.is_none() {
            return self;
        }
        let from = from.map_or_else(|| "*".to_string(), |d| format!("{}T00:00:00Z", d.format("%Y-%m-%d")));
        let to = to.map_or_else(|| "*".to_string(), |d| format!("{}T23:59:59Z", d.format("%Y-%m-%d")));
        self.add_date_range_filters([(field, format!("[{from} TO {to}]"))])
    }

    /// `-field` sorts descending. Blank resets to relevance.
    pub fn set_ordering(&mut self, field: &str) -> &mut Self {
        self.spec.order = SortClause::parse(field).unwrap_or_else(|| SortClause::desc(SCORE_FIELD));
        self
    }

    pub fn set_tie_breaker(&mut self, clauses: Vec<SortClause>) -> &mut Self {
        self.spec.tie_breaker = Some(clauses);
        self
    }

    pub fn set_field_list<S: Into<String>>(&mut self, fields: impl IntoIterator<Item = S>) -> &mut Self {
        self.spec.field_list = fields.into_iter().map(Into::into).collect();
        self
    }

    /// An empty field list turns faceting off.
    pub fn set_facets<S: Into<String>>(
        &mut self,
        fields: impl IntoIterator<Item = S>,
        sort: FacetSort,
    ) -> &mut Self {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.spec.facets = (!fields.is_empty()).then_some(FacetSpec { fields, sort });
        self
    }

    pub fn set_pagination(&mut self, offset: u64, limit: u64) -> &mut Self {
        self.spec.offset = offset;
        self.spec.limit = limit;
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Offset/limit pagination when `paginated`, cursor pagination otherwise.
    pub fn build(&self, paginated: bool, cursor: Option<&str>) -> SearchQuery {
        let page = if paginated {
            Page::Offset {
                offset: self.spec.offset,
                limit: self.spec.limit,
            }
        } else {
            Page::Cursor {
                cursor: cursor.unwrap_or(Page::CURSOR_START).to_string(),
                limit: self.spec.limit,
            }
        };
        SearchQuery {
            spec: self.spec.clone(),
            page,
        }
    }
}
