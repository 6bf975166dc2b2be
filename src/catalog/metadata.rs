//! Metadata catalog: listing and describing database objects.

use crate::catalog::builder::{CatalogQuery, QueryBuilder, SelectQuery, SkipReason};
use crate::db::session::{CatalogRow, DbSession};
use crate::error::{DbError, DbResult};
use crate::models::{
    CatalogEntry, CatalogSettings, ChildEntry, ForeignKeyRef, ObjectFilter, ObjectKind,
    QualifiedName, Resolution,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entries of one listing call. Consumed once.
#[derive(Debug)]
pub struct ObjectListing {
    kind: ObjectKind,
    entries: std::vec::IntoIter<CatalogEntry>,
}

impl ObjectListing {
    fn new(kind: ObjectKind, entries: Vec<CatalogEntry>) -> Self {
        Self {
            kind,
            entries: entries.into_iter(),
        }
    }

    pub fn empty(kind: ObjectKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }
}

impl Iterator for ObjectListing {
    type Item = CatalogEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for ObjectListing {}

async fn fetch_accepted(
    session: &mut dyn DbSession,
    query: &SelectQuery,
) -> DbResult<Vec<CatalogRow>> {
    let rows = session.fetch(&query.sql, &query.params).await?;
    Ok(rows.into_iter().filter(|row| query.accepts(row)).collect())
}

fn entry_from_row(kind: ObjectKind, row: &CatalogRow) -> CatalogEntry {
    CatalogEntry::new(kind, row.text("schema_name"), row.text("object_name"))
        .with_comment(row.opt("object_comment"))
        .with_return_type(row.opt("return_type"))
}

fn child_from_row(row: &CatalogRow, name_column: &str, fallback_ordinal: i64) -> ChildEntry {
    ChildEntry::new(
        row.text(name_column),
        row.text("data_type"),
        row.get_i64("ordinal").unwrap_or(fallback_ordinal),
    )
}

/// Reads the catalog through a borrowed session.
#[derive(Debug, Clone)]
pub struct MetadataCatalog {
    settings: Arc<CatalogSettings>,
    builder: QueryBuilder,
}

impl MetadataCatalog {
    pub fn new(builder: QueryBuilder, settings: Arc<CatalogSettings>) -> Self {
        Self { settings, builder }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// List objects of one kind. Children are not loaded.
    ///
    /// `narrowing` patterns are applied on top of the configured filter for
    /// `kind`; they can never widen the listing.
    pub async fn list_objects(
        &self,
        session: &mut dyn DbSession,
        kind: ObjectKind,
        narrowing: Option<&ObjectFilter>,
        schema: Option<&str>,
    ) -> DbResult<ObjectListing> {
        let filter = self.settings.filter(kind);
        let query = match narrowing {
            Some(narrowing) => self.builder.build_narrowed(
                kind,
                filter,
                &self.settings.schemas,
                schema,
                narrowing,
            )?,
            None => self
                .builder
                .build(kind, filter, &self.settings.schemas, schema)?,
        };
        let query = match query {
            CatalogQuery::Select(q) => q,
            CatalogQuery::Skip(reason) => {
                debug!(kind = %kind, reason = ?reason, "Listing skipped");
                return Ok(ObjectListing::empty(kind));
            }
        };
        let rows = fetch_accepted(session, &query).await?;
        let entries = rows.iter().map(|row| entry_from_row(kind, row)).collect();
        Ok(ObjectListing::new(kind, entries))
    }

    /// Every enabled object under the configured filters.
    pub async fn list_all(&self, session: &mut dyn DbSession) -> DbResult<Vec<CatalogEntry>> {
        let mut all = Vec::new();
        for kind in ObjectKind::ALL {
            let listing = self
                .list_objects(session, kind, None, None)
                .await?;
            all.extend(listing);
        }
        Ok(all)
    }

    /// Describe one object together with its columns or parameters.
    pub async fn describe(
        &self,
        session: &mut dyn DbSession,
        kind: ObjectKind,
        name: &QualifiedName,
    ) -> DbResult<CatalogEntry> {
        let query = self.builder.lookup(
            kind,
            self.settings.filter(kind),
            &self.settings.schemas,
            name.schema.as_deref(),
            &name.name,
        )?;
        let query = match query {
            CatalogQuery::Select(q) => q,
            CatalogQuery::Skip(SkipReason::Disabled) => {
                return Err(DbError::kind_disabled(kind.as_str()));
            }
            CatalogQuery::Skip(SkipReason::Unsupported) => {
                return Err(DbError::not_found(kind.as_str(), name.to_string()));
            }
        };

        let rows = fetch_accepted(session, &query).await?;
        let Some(row) = rows.first() else {
            return Err(DbError::not_found(kind.as_str(), name.to_string()));
        };
        if rows.len() > 1 {
            debug!(kind = %kind, name = %name, matches = rows.len(), "Ambiguous name, using first match");
        }
        let entry = entry_from_row(kind, row);

        let children = if kind.has_columns() {
            self.load_columns(session, &entry).await?
        } else if kind.has_parameters() {
            self.load_parameters(session, &entry).await?
        } else {
            Vec::new()
        };
        Ok(entry.with_children(children))
    }

    async fn load_columns(
        &self,
        session: &mut dyn DbSession,
        entry: &CatalogEntry,
    ) -> DbResult<Vec<ChildEntry>> {
        let query = self.builder.columns(&entry.schema_name, &entry.object_name);
        let rows = session.fetch(&query.sql, &query.params).await?;
        let mut columns: Vec<ChildEntry> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                child_from_row(row, "column_name", i as i64 + 1)
                    .with_comment(row.opt("column_comment"))
            })
            .collect();

        if entry.kind == ObjectKind::Table {
            self.attach_foreign_keys(session, entry, &mut columns).await?;
        }
        Ok(columns)
    }

    async fn load_parameters(
        &self,
        session: &mut dyn DbSession,
        entry: &CatalogEntry,
    ) -> DbResult<Vec<ChildEntry>> {
        let Some(query) = self
            .builder
            .parameters(&entry.schema_name, &entry.object_name)
        else {
            return Ok(Vec::new());
        };
        let rows = session.fetch(&query.sql, &query.params).await?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                child_from_row(row, "parameter_name", i as i64 + 1)
                    .with_mode(row.opt("parameter_mode"))
            })
            .collect())
    }

    /// Resolve foreign keys by name: first against the table's own columns,
    /// then with one column lookup per referenced table. Anything that cannot
    /// be resolved is reported name-only.
    async fn attach_foreign_keys(
        &self,
        session: &mut dyn DbSession,
        entry: &CatalogEntry,
        columns: &mut [ChildEntry],
    ) -> DbResult<()> {
        let query = self
            .builder
            .foreign_keys(&entry.schema_name, &entry.object_name);
        let rows = session.fetch(&query.sql, &query.params).await?;
        if rows.is_empty() {
            return Ok(());
        }

        let own_key = (entry.schema_name.clone(), entry.object_name.clone());
        let mut known: HashMap<(String, String), Option<HashMap<String, String>>> =
            HashMap::new();
        known.insert(
            own_key,
            Some(
                columns
                    .iter()
                    .map(|c| (c.name.clone(), c.data_type.clone()))
                    .collect(),
            ),
        );

        for row in &rows {
            let schema = row.text("ref_schema");
            let table = row.text("ref_table");
            let target = (schema.clone(), table.clone());
            if !known.contains_key(&target) {
                let lookup = self.builder.columns(&schema, &table);
                let types = match session.fetch(&lookup.sql, &lookup.params).await {
                    Ok(found) if !found.is_empty() => Some(
                        found
                            .iter()
                            .map(|r| (r.text("column_name"), r.text("data_type")))
                            .collect(),
                    ),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(table = %format!("{}.{}", schema, table), error = %e, "Referenced table lookup failed");
                        None
                    }
                };
                known.insert(target.clone(), types);
            }

            let column = row.opt("ref_column");
            let resolution = match (known.get(&target).and_then(|t| t.as_ref()), &column) {
                (Some(types), Some(col)) => match types.get(col) {
                    Some(data_type) => Resolution::Resolved {
                        data_type: data_type.clone(),
                    },
                    None => Resolution::NameOnly,
                },
                _ => Resolution::NameOnly,
            };
            let reference = ForeignKeyRef {
                constraint: row.opt("constraint_name"),
                schema,
                table,
                column,
                resolution,
            };
            let source = row.text("column_name");
            if let Some(child) = columns.iter_mut().find(|c| c.name == source) {
                child.foreign_keys.push(reference);
            }
        }
        Ok(())
    }
}
