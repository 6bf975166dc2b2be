//! Parameterized catalog query construction.
//!
//! User-supplied patterns are always bound, never spliced into SQL. LIKE
//! patterns become predicates on the wrapped listing query; regular
//! expressions are applied to fetched rows and must match the whole name.
//! Caller patterns only narrow a listing: they are ANDed with the
//! configured ones, never substituted for them.

use crate::catalog::queries;
use crate::db::session::CatalogRow;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ObjectFilter, ObjectKind};
use regex::{Regex, RegexBuilder};

/// Why a listing runs no query at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowColumn {
    Schema,
    Object,
}

impl RowColumn {
    fn name(&self) -> &'static str {
        match self {
            Self::Schema => "schema_name",
            Self::Object => "object_name",
        }
    }
}

/// A regular expression checked against one column of each fetched row.
#[derive(Debug, Clone)]
pub struct RowFilter {
    pub column: RowColumn,
    pub regex: Regex,
}

#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub sql: String,
    pub params: Vec<String>,
    pub row_filters: Vec<RowFilter>,
}

impl SelectQuery {
    fn fixed(sql: &str, params: Vec<String>) -> Self {
        Self {
            sql: sql.to_string(),
            params,
            row_filters: Vec::new(),
        }
    }

    /// Whether a fetched row passes every regular expression.
    pub fn accepts(&self, row: &CatalogRow) -> bool {
        self.row_filters.iter().all(|f| {
            f.regex
                .is_match(row.get(f.column.name()).unwrap_or_default())
        })
    }
}

#[derive(Debug, Clone)]
pub enum CatalogQuery {
    Skip(SkipReason),
    Select(SelectQuery),
}

/// Accumulates WHERE predicates and their bound values.
struct Predicates {
    dialect: DatabaseType,
    clauses: Vec<String>,
    params: Vec<String>,
}

impl Predicates {
    fn new(dialect: DatabaseType) -> Self {
        Self {
            dialect,
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: &str) -> String {
        self.params.push(value.to_string());
        match self.dialect {
            DatabaseType::PostgreSQL => format!("${}", self.params.len()),
            DatabaseType::MySQL | DatabaseType::SQLite => "?".to_string(),
        }
    }

    fn like(&mut self, column: RowColumn, pattern: &str, case_sensitive: bool) {
        let col = column.name();
        let clause = match (case_sensitive, self.dialect) {
            // SQLite has no default LIKE escape character
            (false, DatabaseType::SQLite) => {
                let ph = self.bind(pattern);
                format!("UPPER({col}) LIKE UPPER({ph}) ESCAPE '\\'")
            }
            (false, _) => {
                let ph = self.bind(pattern);
                format!("UPPER({col}) LIKE UPPER({ph})")
            }
            (true, DatabaseType::PostgreSQL) => {
                let ph = self.bind(pattern);
                format!("{col} LIKE {ph}")
            }
            (true, DatabaseType::MySQL) => {
                let ph = self.bind(pattern);
                format!("CAST({col} AS BINARY) LIKE CAST({ph} AS BINARY)")
            }
            // SQLite LIKE ignores ASCII case; GLOB does not
            (true, DatabaseType::SQLite) => {
                let ph = self.bind(&like_to_glob(pattern));
                format!("{col} GLOB {ph}")
            }
        };
        self.clauses.push(clause);
    }

    fn equals(&mut self, column: RowColumn, value: &str, case_sensitive: bool) {
        let col = column.name();
        let ph = self.bind(value);
        self.clauses.push(if case_sensitive {
            format!("{col} = {ph}")
        } else {
            format!("UPPER({col}) = UPPER({ph})")
        });
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Translate a LIKE pattern (`%`, `_`, backslash escapes) to a GLOB pattern.
pub fn like_to_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '\\' => match chars.next() {
                Some(escaped) => push_glob_literal(&mut out, escaped),
                None => out.push('\\'),
            },
            other => push_glob_literal(&mut out, other),
        }
    }
    out
}

fn push_glob_literal(out: &mut String, c: char) {
    match c {
        '*' | '?' | '[' => {
            out.push('[');
            out.push(c);
            out.push(']');
        }
        _ => out.push(c),
    }
}

/// Anchor a name pattern so it must match the entire name.
pub fn whole_name(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

pub fn compile_regex(pattern: &str, case_sensitive: bool) -> DbResult<Regex> {
    RegexBuilder::new(&whole_name(pattern))
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| {
            DbError::query(
                format!("Invalid regexp pattern '{}': {}", pattern, e),
                None,
                "Use regular expression syntax matching the whole name, e.g. 'CUST.*' or 'ORDERS|INVOICES'",
            )
        })
}

/// Builds catalog queries for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    dialect: DatabaseType,
    case_sensitive: bool,
}

impl QueryBuilder {
    pub fn new(dialect: DatabaseType, case_sensitive: bool) -> Self {
        Self {
            dialect,
            case_sensitive,
        }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    /// Listing query for `kind`.
    ///
    /// `schema_filter` is the filter configured for schemas; its patterns
    /// also scope every other kind by schema name.
    pub fn build(
        &self,
        kind: ObjectKind,
        filter: &ObjectFilter,
        schema_filter: &ObjectFilter,
        schema: Option<&str>,
    ) -> DbResult<CatalogQuery> {
        self.select(kind, filter, schema_filter, schema, None, None)
    }

    /// Listing query with caller patterns ANDed onto the configured ones.
    ///
    /// `narrowing.enable` is ignored; only `filter` decides whether the kind
    /// is listed at all.
    pub fn build_narrowed(
        &self,
        kind: ObjectKind,
        filter: &ObjectFilter,
        schema_filter: &ObjectFilter,
        schema: Option<&str>,
        narrowing: &ObjectFilter,
    ) -> DbResult<CatalogQuery> {
        self.select(kind, filter, schema_filter, schema, None, Some(narrowing))
    }

    /// Query for one object by name, honoring the same filters as listing.
    pub fn lookup(
        &self,
        kind: ObjectKind,
        filter: &ObjectFilter,
        schema_filter: &ObjectFilter,
        schema: Option<&str>,
        name: &str,
    ) -> DbResult<CatalogQuery> {
        self.select(kind, filter, schema_filter, schema, Some(name), None)
    }

    fn narrow(
        &self,
        column: RowColumn,
        filter: &ObjectFilter,
        predicates: &mut Predicates,
        row_filters: &mut Vec<RowFilter>,
    ) -> DbResult<()> {
        if let Some(pattern) = &filter.like_pattern {
            predicates.like(column, pattern, self.case_sensitive);
        }
        if let Some(pattern) = &filter.regexp_pattern {
            row_filters.push(RowFilter {
                column,
                regex: compile_regex(pattern, self.case_sensitive)?,
            });
        }
        Ok(())
    }

    fn select(
        &self,
        kind: ObjectKind,
        filter: &ObjectFilter,
        schema_filter: &ObjectFilter,
        schema: Option<&str>,
        name: Option<&str>,
        narrowing: Option<&ObjectFilter>,
    ) -> DbResult<CatalogQuery> {
        if !filter.enable {
            return Ok(CatalogQuery::Skip(SkipReason::Disabled));
        }
        let Some(base) = queries::listing(self.dialect, kind) else {
            return Ok(CatalogQuery::Skip(SkipReason::Unsupported));
        };

        let mut predicates = Predicates::new(self.dialect);
        let mut row_filters = Vec::new();

        if kind != ObjectKind::Schema {
            self.narrow(RowColumn::Schema, schema_filter, &mut predicates, &mut row_filters)?;
        }
        self.narrow(RowColumn::Object, filter, &mut predicates, &mut row_filters)?;
        if let Some(narrowing) = narrowing {
            self.narrow(RowColumn::Object, narrowing, &mut predicates, &mut row_filters)?;
        }
        if let Some(schema) = schema {
            predicates.equals(RowColumn::Schema, schema, self.case_sensitive);
        }
        if let Some(name) = name {
            predicates.equals(RowColumn::Object, name, self.case_sensitive);
        }

        let sql = format!(
            "SELECT * FROM ({}) AS catalog{} ORDER BY schema_name, object_name",
            base.trim(),
            predicates.where_clause()
        );
        Ok(CatalogQuery::Select(SelectQuery {
            sql,
            params: predicates.params,
            row_filters,
        }))
    }

    /// Columns of a table or view, by exact stored names.
    pub fn columns(&self, schema: &str, table: &str) -> SelectQuery {
        SelectQuery::fixed(
            queries::columns(self.dialect),
            vec![schema.to_string(), table.to_string()],
        )
    }

    pub fn foreign_keys(&self, schema: &str, table: &str) -> SelectQuery {
        SelectQuery::fixed(
            queries::foreign_keys(self.dialect),
            vec![schema.to_string(), table.to_string()],
        )
    }

    pub fn parameters(&self, schema: &str, routine: &str) -> Option<SelectQuery> {
        queries::parameters(self.dialect)
            .map(|sql| SelectQuery::fixed(sql, vec![schema.to_string(), routine.to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(query: CatalogQuery) -> SelectQuery {
        match query {
            CatalogQuery::Select(q) => q,
            CatalogQuery::Skip(reason) => panic!("unexpected skip: {:?}", reason),
        }
    }

    #[test]
    fn test_disabled_kind_skips() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, false);
        let query = builder
            .build(
                ObjectKind::View,
                &ObjectFilter::disabled(),
                &ObjectFilter::enabled(),
                None,
            )
            .unwrap();
        assert!(matches!(query, CatalogQuery::Skip(SkipReason::Disabled)));
    }

    #[test]
    fn test_sqlite_functions_unsupported() {
        let builder = QueryBuilder::new(DatabaseType::SQLite, false);
        let query = builder
            .build(
                ObjectKind::Function,
                &ObjectFilter::enabled(),
                &ObjectFilter::enabled(),
                None,
            )
            .unwrap();
        assert!(matches!(query, CatalogQuery::Skip(SkipReason::Unsupported)));
    }

    #[test]
    fn test_like_is_bound_not_spliced() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, false);
        let filter = ObjectFilter::enabled().with_like("CUST%' OR 1=1 --");
        let q = select(
            builder
                .build(ObjectKind::Table, &filter, &ObjectFilter::enabled(), None)
                .unwrap(),
        );
        assert!(q.sql.contains("UPPER(object_name) LIKE UPPER($1)"));
        assert!(!q.sql.contains("OR 1=1"));
        assert_eq!(q.params, vec!["CUST%' OR 1=1 --".to_string()]);
        assert!(q.sql.ends_with("ORDER BY schema_name, object_name"));
    }

    #[test]
    fn test_case_sensitive_like_per_dialect() {
        let filter = ObjectFilter::enabled().with_like("ORD%");
        let schema = ObjectFilter::enabled();

        let pg = select(
            QueryBuilder::new(DatabaseType::PostgreSQL, true)
                .build(ObjectKind::Table, &filter, &schema, None)
                .unwrap(),
        );
        assert!(pg.sql.contains("object_name LIKE $1"));

        let my = select(
            QueryBuilder::new(DatabaseType::MySQL, true)
                .build(ObjectKind::Table, &filter, &schema, None)
                .unwrap(),
        );
        assert!(my.sql.contains("CAST(object_name AS BINARY) LIKE CAST(? AS BINARY)"));

        let lite = select(
            QueryBuilder::new(DatabaseType::SQLite, true)
                .build(ObjectKind::Table, &filter, &schema, None)
                .unwrap(),
        );
        assert!(lite.sql.contains("object_name GLOB ?"));
        assert_eq!(lite.params, vec!["ORD*".to_string()]);
    }

    #[test]
    fn test_schema_patterns_scope_other_kinds() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, false);
        let schema_filter = ObjectFilter::enabled().with_like("SALES%").with_regexp("SALES.*");
        let q = select(
            builder
                .build(
                    ObjectKind::Table,
                    &ObjectFilter::enabled().with_like("C%"),
                    &schema_filter,
                    Some("sales_eu"),
                )
                .unwrap(),
        );
        assert!(q.sql.contains("UPPER(schema_name) LIKE UPPER($1)"));
        assert!(q.sql.contains("UPPER(object_name) LIKE UPPER($2)"));
        assert!(q.sql.contains("UPPER(schema_name) = UPPER($3)"));
        assert_eq!(q.params, vec!["SALES%", "C%", "sales_eu"]);
        assert_eq!(q.row_filters.len(), 1);
        assert_eq!(q.row_filters[0].column, RowColumn::Schema);
    }

    #[test]
    fn test_schema_kind_uses_own_filter_once() {
        let builder = QueryBuilder::new(DatabaseType::MySQL, false);
        let filter = ObjectFilter::enabled().with_like("SALES%");
        let q = select(
            builder
                .build(ObjectKind::Schema, &filter, &filter, None)
                .unwrap(),
        );
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn test_regex_row_filter_matches_whole_name_case_insensitive() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, false);
        let filter = ObjectFilter::enabled().with_regexp(".*order.*");
        let q = select(
            builder
                .build(ObjectKind::Table, &filter, &ObjectFilter::enabled(), None)
                .unwrap(),
        );
        let row = CatalogRow::new().with("object_name", Some("CUSTOMER_ORDERS"));
        assert!(q.accepts(&row));
        let row = CatalogRow::new().with("object_name", Some("INVOICES"));
        assert!(!q.accepts(&row));
    }

    #[test]
    fn test_regex_rejects_partial_match() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, false);
        let filter = ObjectFilter::enabled().with_regexp("cut.*");
        let q = select(
            builder
                .build(ObjectKind::Table, &filter, &ObjectFilter::enabled(), None)
                .unwrap(),
        );
        assert!(q.accepts(&CatalogRow::new().with("object_name", Some("CUT_RATES"))));
        assert!(!q.accepts(&CatalogRow::new().with("object_name", Some("EXECUTE_LOG"))));

        let filter = ObjectFilter::enabled().with_regexp("ORDERS|INVOICES");
        let q = select(
            builder
                .build(ObjectKind::Table, &filter, &ObjectFilter::enabled(), None)
                .unwrap(),
        );
        assert!(q.accepts(&CatalogRow::new().with("object_name", Some("invoices"))));
        assert!(!q.accepts(&CatalogRow::new().with("object_name", Some("ORDERS_ARCHIVE"))));
    }

    #[test]
    fn test_narrowing_ands_with_configured_patterns() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, false);
        let configured = ObjectFilter::enabled().with_like("V%").with_regexp("V_.*");
        let narrowing = ObjectFilter::enabled().with_like("%PUB%").with_regexp(".*");
        let q = select(
            builder
                .build_narrowed(
                    ObjectKind::Table,
                    &configured,
                    &ObjectFilter::enabled(),
                    None,
                    &narrowing,
                )
                .unwrap(),
        );
        assert!(q.sql.contains("UPPER(object_name) LIKE UPPER($1) AND UPPER(object_name) LIKE UPPER($2)"));
        assert_eq!(q.params, vec!["V%", "%PUB%"]);
        assert_eq!(q.row_filters.len(), 2);
        assert!(q.accepts(&CatalogRow::new().with("object_name", Some("V_PUBLIC"))));
        assert!(!q.accepts(&CatalogRow::new().with("object_name", Some("SECRET_PAYROLL"))));
    }

    #[test]
    fn test_narrowing_cannot_enable_disabled_kind() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, false);
        let query = builder
            .build_narrowed(
                ObjectKind::View,
                &ObjectFilter::disabled(),
                &ObjectFilter::enabled(),
                None,
                &ObjectFilter::enabled().with_like("%"),
            )
            .unwrap();
        assert!(matches!(query, CatalogQuery::Skip(SkipReason::Disabled)));
    }

    #[test]
    fn test_sqlite_case_insensitive_like_declares_escape() {
        let builder = QueryBuilder::new(DatabaseType::SQLite, false);
        let filter = ObjectFilter::enabled().with_like(r"customer\_%");
        let q = select(
            builder
                .build(ObjectKind::Table, &filter, &ObjectFilter::enabled(), None)
                .unwrap(),
        );
        assert!(q.sql.contains(r"UPPER(object_name) LIKE UPPER(?) ESCAPE '\'"));

        let pg = select(
            QueryBuilder::new(DatabaseType::PostgreSQL, false)
                .build(ObjectKind::Table, &filter, &ObjectFilter::enabled(), None)
                .unwrap(),
        );
        assert!(!pg.sql.contains("ESCAPE"));
    }

    #[test]
    fn test_regex_case_sensitive() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, true);
        let filter = ObjectFilter::enabled().with_regexp("ORD.*");
        let q = select(
            builder
                .build(ObjectKind::Table, &filter, &ObjectFilter::enabled(), None)
                .unwrap(),
        );
        assert!(q.accepts(&CatalogRow::new().with("object_name", Some("ORDERS"))));
        assert!(!q.accepts(&CatalogRow::new().with("object_name", Some("orders"))));
    }

    #[test]
    fn test_invalid_regex_is_query_error() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, false);
        let filter = ObjectFilter::enabled().with_regexp("(unclosed");
        let err = builder
            .build(ObjectKind::Table, &filter, &ObjectFilter::enabled(), None)
            .unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
    }

    #[test]
    fn test_lookup_matches_exact_name() {
        let builder = QueryBuilder::new(DatabaseType::PostgreSQL, true);
        let q = select(
            builder
                .lookup(
                    ObjectKind::Table,
                    &ObjectFilter::enabled(),
                    &ObjectFilter::enabled(),
                    Some("public"),
                    "orders",
                )
                .unwrap(),
        );
        assert!(q.sql.contains("schema_name = $1 AND object_name = $2"));
    }

    #[test]
    fn test_like_to_glob() {
        assert_eq!(like_to_glob("CUST%"), "CUST*");
        assert_eq!(like_to_glob("A_B"), "A?B");
        assert_eq!(like_to_glob("a*b"), "a[*]b");
        assert_eq!(like_to_glob(r"100\%"), "100%");
        assert_eq!(like_to_glob("[x]?"), "[[]x][?]");
    }

    #[test]
    fn test_child_queries() {
        let builder = QueryBuilder::new(DatabaseType::SQLite, false);
        let q = builder.columns("main", "orders");
        assert_eq!(q.params, vec!["main", "orders"]);
        assert!(builder.parameters("main", "f").is_none());
        assert!(
            QueryBuilder::new(DatabaseType::MySQL, false)
                .parameters("db", "f")
                .is_some()
        );
    }
}
