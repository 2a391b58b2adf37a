//! Immutable list-query configuration.
//!
//! Each stage consumes the query and returns a new one, so the order stages
//! are applied in never changes the result. Storage compiles the finished
//! value into a page query and a count query over the same [`Predicate`].

use crate::criteria::{self, check_field_name, Condition, Criteria, QueryParams};
use crate::error::{AppError, AppResult};
use crate::models::Collection;

pub const DEFAULT_SORT: &str = "-createdAt";
pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_PAGE: u32 = 1;

/// Which side of the tombstone a listing looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Active,
    Tombstoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        Self {
            page: positive_or(page, DEFAULT_PAGE),
            limit: positive_or(limit, DEFAULT_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.limit) * u64::from(self.page.saturating_sub(1))
    }
}

fn positive_or(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// One relation to expand, with the relations to expand inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateNode {
    pub field: String,
    pub target: Collection,
    pub many: bool,
    pub nested: Vec<PopulateNode>,
}

/// Parses `a,b.c,b.d` into a tree, validating every hop against the
/// relations of the collection it starts from.
pub fn parse_populate(collection: Collection, spec: &str) -> AppResult<Vec<PopulateNode>> {
    let mut roots: Vec<PopulateNode> = Vec::new();
    for path in spec
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
    {
        insert_path(&mut roots, collection, path, path)?;
    }
    Ok(roots)
}

fn insert_path(
    nodes: &mut Vec<PopulateNode>,
    collection: Collection,
    path: &str,
    full: &str,
) -> AppResult<()> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let relation = collection.relation(head).ok_or_else(|| {
        AppError::validation(format!(
            "cannot populate '{}': {} has no relation '{}'",
            full, collection, head
        ))
    })?;

    let idx = match nodes.iter().position(|n| n.field == head) {
        Some(idx) => idx,
        None => {
            nodes.push(PopulateNode {
                field: head.to_string(),
                target: relation.target,
                many: relation.many,
                nested: Vec::new(),
            });
            nodes.len() - 1
        }
    };

    match rest {
        Some(rest) => insert_path(&mut nodes[idx].nested, relation.target, rest, full),
        None => Ok(()),
    }
}

pub fn parse_sort(spec: &str) -> AppResult<Vec<SortKey>> {
    let keys = spec
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|part| {
            let (field, descending) = match part.strip_prefix('-') {
                Some(field) => (field, true),
                None => (part.strip_prefix('+').unwrap_or(part), false),
            };
            check_field_name(field)?;
            Ok(SortKey {
                field: field.to_string(),
                descending,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    if keys.is_empty() {
        return parse_sort(DEFAULT_SORT);
    }
    Ok(keys)
}

/// The part of a listing that decides membership: shared verbatim by the
/// page query and the count query.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub collection: Collection,
    pub scope: Scope,
    pub conditions: Vec<Condition>,
    pub search_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub predicate: Predicate,
    pub populate: Vec<PopulateNode>,
    pub sort: Vec<SortKey>,
    pub pagination: Pagination,
}

impl ListQuery {
    pub fn new(collection: Collection, scope: Scope) -> Self {
        Self {
            predicate: Predicate {
                collection,
                scope,
                conditions: Vec::new(),
                search_terms: Vec::new(),
            },
            populate: Vec::new(),
            sort: vec![SortKey {
                field: "createdAt".into(),
                descending: true,
            }],
            pagination: Pagination::default(),
        }
    }

    /// Applies every stage from raw parameters.
    pub fn from_params(collection: Collection, scope: Scope, params: &QueryParams) -> AppResult<Self> {
        Ok(Self::new(collection, scope)
            .filtering(criteria::compile(params)?)
            .searching(params.get("search"))
            .populated(params.get("populate"))?
            .sorting(params.get("sort"))?
            .paginating(params.get("page"), params.get("limit")))
    }

    pub fn filtering(mut self, criteria: Criteria) -> Self {
        self.predicate.conditions.extend(criteria.conditions);
        self
    }

    /// Adds a constraint fixed by the caller rather than by the client.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.predicate.conditions.push(condition);
        self
    }

    pub fn searching(mut self, search: Option<&str>) -> Self {
        self.predicate.search_terms = search
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        self
    }

    pub fn populated(mut self, spec: Option<&str>) -> AppResult<Self> {
        self.populate = match spec {
            Some(spec) => parse_populate(self.predicate.collection, spec)?,
            None => Vec::new(),
        };
        Ok(self)
    }

    pub fn sorting(mut self, spec: Option<&str>) -> AppResult<Self> {
        self.sort = parse_sort(spec.unwrap_or(DEFAULT_SORT))?;
        Ok(self)
    }

    pub fn paginating(mut self, page: Option<&str>, limit: Option<&str>) -> Self {
        self.pagination = Pagination::parse(page, limit);
        self
    }

    /// The count side: same membership, no ordering, expansion or paging.
    pub fn counting(&self) -> Predicate {
        self.predicate.clone()
    }
}
