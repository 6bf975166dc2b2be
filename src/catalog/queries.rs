//! Catalog SQL per dialect.
//!
//! Listing queries produce `schema_name`, `object_name`, `object_comment`
//! (functions also `return_type`) and are wrapped by the query builder, so
//! they carry no parameters of their own. Child queries take the schema and
//! object name as their two parameters, in that order.
//!
//! Every query only returns what the session user may access, so per-caller
//! sessions see per-caller catalogs. PostgreSQL checks privileges explicitly;
//! MySQL's `information_schema` filters on its own; SQLite has no users.

use crate::models::{DatabaseType, ObjectKind};

pub mod postgres {
    pub const SCHEMAS: &str = r#"
        SELECT
            n.nspname::text AS schema_name,
            n.nspname::text AS object_name,
            obj_description(n.oid, 'pg_namespace')::text AS object_comment
        FROM pg_catalog.pg_namespace n
        WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND n.nspname NOT LIKE 'pg\_toast%'
          AND n.nspname NOT LIKE 'pg\_temp\_%'
          AND has_schema_privilege(n.oid, 'USAGE')
        "#;

    pub const TABLES: &str = r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS object_name,
            obj_description(c.oid, 'pg_class')::text AS object_comment
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
          AND NOT c.relispartition
          AND n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND n.nspname NOT LIKE 'pg\_toast%'
          AND has_schema_privilege(n.oid, 'USAGE')
          AND has_table_privilege(c.oid, 'SELECT, INSERT, UPDATE, DELETE, TRUNCATE, REFERENCES, TRIGGER')
        "#;

    pub const VIEWS: &str = r#"
        SELECT
            n.nspname::text AS schema_name,
            c.relname::text AS object_name,
            obj_description(c.oid, 'pg_class')::text AS object_comment
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('v', 'm')
          AND n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND has_schema_privilege(n.oid, 'USAGE')
          AND has_table_privilege(c.oid, 'SELECT, INSERT, UPDATE, DELETE, TRUNCATE, REFERENCES, TRIGGER')
        "#;

    // Overloads collapse to one entry per name
    pub const FUNCTIONS: &str = r#"
        SELECT DISTINCT ON (n.nspname, p.proname)
            n.nspname::text AS schema_name,
            p.proname::text AS object_name,
            obj_description(p.oid, 'pg_proc')::text AS object_comment,
            pg_catalog.format_type(p.prorettype, NULL)::text AS return_type
        FROM pg_catalog.pg_proc p
        JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
        WHERE p.prokind = 'f'
          AND n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND has_schema_privilege(n.oid, 'USAGE')
          AND has_function_privilege(p.oid, 'EXECUTE')
        ORDER BY n.nspname, p.proname, p.oid
        "#;

    pub const SCRIPTS: &str = r#"
        SELECT DISTINCT ON (n.nspname, p.proname)
            n.nspname::text AS schema_name,
            p.proname::text AS object_name,
            obj_description(p.oid, 'pg_proc')::text AS object_comment
        FROM pg_catalog.pg_proc p
        JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
        WHERE p.prokind = 'p'
          AND n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND has_schema_privilege(n.oid, 'USAGE')
          AND has_function_privilege(p.oid, 'EXECUTE')
        ORDER BY n.nspname, p.proname, p.oid
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            a.attname::text AS column_name,
            pg_catalog.format_type(a.atttypid, a.atttypmod)::text AS data_type,
            a.attnum::int8 AS ordinal,
            col_description(c.oid, a.attnum)::text AS column_comment
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relname = $2
          AND a.attnum > 0
          AND NOT a.attisdropped
          AND has_schema_privilege(n.oid, 'USAGE')
          AND has_column_privilege(c.oid, a.attnum, 'SELECT, INSERT, UPDATE, REFERENCES')
        ORDER BY a.attnum
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            con.conname::text AS constraint_name,
            src.attname::text AS column_name,
            rn.nspname::text AS ref_schema,
            rc.relname::text AS ref_table,
            ref.attname::text AS ref_column
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
        JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(src_attnum, ref_attnum)
        JOIN pg_catalog.pg_attribute src
            ON src.attrelid = con.conrelid AND src.attnum = k.src_attnum
        JOIN pg_catalog.pg_attribute ref
            ON ref.attrelid = con.confrelid AND ref.attnum = k.ref_attnum
        WHERE con.contype = 'f'
          AND n.nspname = $1
          AND c.relname = $2
          AND has_schema_privilege(n.oid, 'USAGE')
          AND has_table_privilege(c.oid, 'SELECT, INSERT, UPDATE, DELETE, TRUNCATE, REFERENCES, TRIGGER')
          AND has_schema_privilege(rn.oid, 'USAGE')
          AND has_table_privilege(rc.oid, 'SELECT, INSERT, UPDATE, DELETE, TRUNCATE, REFERENCES, TRIGGER')
        ORDER BY con.conname, src.attnum
        "#;

    /// Overloads are collapsed to the lowest specific name. The
    /// information_schema views already hide routines the user cannot run.
    pub const PARAMETERS: &str = r#"
        SELECT
            p.parameter_name::text AS parameter_name,
            p.data_type::text AS data_type,
            p.ordinal_position::int8 AS ordinal,
            p.parameter_mode::text AS parameter_mode
        FROM information_schema.parameters p
        WHERE p.specific_schema = $1
          AND p.specific_name = (
              SELECT MIN(r.specific_name)
              FROM information_schema.routines r
              WHERE r.routine_schema = $1 AND r.routine_name = $2
          )
        ORDER BY p.ordinal_position
        "#;
}

pub mod mysql {
    pub const SCHEMAS: &str = r#"
        SELECT
            CONVERT(SCHEMA_NAME USING utf8mb4) AS schema_name,
            CONVERT(SCHEMA_NAME USING utf8mb4) AS object_name,
            CAST(NULL AS CHAR) AS object_comment
        FROM information_schema.SCHEMATA
        WHERE SCHEMA_NAME NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        "#;

    pub const TABLES: &str = r#"
        SELECT
            CONVERT(TABLE_SCHEMA USING utf8mb4) AS schema_name,
            CONVERT(TABLE_NAME USING utf8mb4) AS object_name,
            CONVERT(NULLIF(TABLE_COMMENT, '') USING utf8mb4) AS object_comment
        FROM information_schema.TABLES
        WHERE TABLE_TYPE = 'BASE TABLE'
          AND TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        "#;

    /// MySQL reports the comment of every view as 'VIEW'.
    pub const VIEWS: &str = r#"
        SELECT
            CONVERT(TABLE_SCHEMA USING utf8mb4) AS schema_name,
            CONVERT(TABLE_NAME USING utf8mb4) AS object_name,
            CONVERT(NULLIF(NULLIF(TABLE_COMMENT, 'VIEW'), '') USING utf8mb4) AS object_comment
        FROM information_schema.TABLES
        WHERE TABLE_TYPE = 'VIEW'
          AND TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        "#;

    pub const FUNCTIONS: &str = r#"
        SELECT
            CONVERT(ROUTINE_SCHEMA USING utf8mb4) AS schema_name,
            CONVERT(ROUTINE_NAME USING utf8mb4) AS object_name,
            CONVERT(NULLIF(ROUTINE_COMMENT, '') USING utf8mb4) AS object_comment,
            CONVERT(DTD_IDENTIFIER USING utf8mb4) AS return_type
        FROM information_schema.ROUTINES
        WHERE ROUTINE_TYPE = 'FUNCTION'
          AND ROUTINE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        "#;

    pub const SCRIPTS: &str = r#"
        SELECT
            CONVERT(ROUTINE_SCHEMA USING utf8mb4) AS schema_name,
            CONVERT(ROUTINE_NAME USING utf8mb4) AS object_name,
            CONVERT(NULLIF(ROUTINE_COMMENT, '') USING utf8mb4) AS object_comment
        FROM information_schema.ROUTINES
        WHERE ROUTINE_TYPE = 'PROCEDURE'
          AND ROUTINE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS column_name,
            CONVERT(COLUMN_TYPE USING utf8mb4) AS data_type,
            CAST(ORDINAL_POSITION AS SIGNED) AS ordinal,
            CONVERT(NULLIF(COLUMN_COMMENT, '') USING utf8mb4) AS column_comment
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(CONSTRAINT_NAME USING utf8mb4) AS constraint_name,
            CONVERT(COLUMN_NAME USING utf8mb4) AS column_name,
            CONVERT(REFERENCED_TABLE_SCHEMA USING utf8mb4) AS ref_schema,
            CONVERT(REFERENCED_TABLE_NAME USING utf8mb4) AS ref_table,
            CONVERT(REFERENCED_COLUMN_NAME USING utf8mb4) AS ref_column
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
          AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
        "#;

    /// Position 0 is the return value of a function.
    pub const PARAMETERS: &str = r#"
        SELECT
            CONVERT(PARAMETER_NAME USING utf8mb4) AS parameter_name,
            CONVERT(DTD_IDENTIFIER USING utf8mb4) AS data_type,
            CAST(ORDINAL_POSITION AS SIGNED) AS ordinal,
            CONVERT(PARAMETER_MODE USING utf8mb4) AS parameter_mode
        FROM information_schema.PARAMETERS
        WHERE SPECIFIC_SCHEMA = ? AND SPECIFIC_NAME = ?
          AND ORDINAL_POSITION > 0
        ORDER BY ORDINAL_POSITION
        "#;
}

pub mod sqlite {
    pub const SCHEMAS: &str = r#"
        SELECT
            name AS schema_name,
            name AS object_name,
            NULL AS object_comment
        FROM pragma_database_list
        WHERE name <> 'temp'
        "#;

    pub const TABLES: &str = r#"
        SELECT
            'main' AS schema_name,
            name AS object_name,
            NULL AS object_comment
        FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
        "#;

    pub const VIEWS: &str = r#"
        SELECT
            'main' AS schema_name,
            name AS object_name,
            NULL AS object_comment
        FROM sqlite_master
        WHERE type = 'view'
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            name AS column_name,
            type AS data_type,
            cid + 1 AS ordinal,
            NULL AS column_comment
        FROM pragma_table_info(?2, ?1)
        ORDER BY cid
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            'fk_' || id AS constraint_name,
            "from" AS column_name,
            ?1 AS ref_schema,
            "table" AS ref_table,
            "to" AS ref_column
        FROM pragma_foreign_key_list(?2, ?1)
        ORDER BY id, seq
        "#;
}

/// Base listing query, `None` when the dialect has no such objects.
pub fn listing(dialect: DatabaseType, kind: ObjectKind) -> Option<&'static str> {
    match (dialect, kind) {
        (DatabaseType::PostgreSQL, ObjectKind::Schema) => Some(postgres::SCHEMAS),
        (DatabaseType::PostgreSQL, ObjectKind::Table) => Some(postgres::TABLES),
        (DatabaseType::PostgreSQL, ObjectKind::View) => Some(postgres::VIEWS),
        (DatabaseType::PostgreSQL, ObjectKind::Function) => Some(postgres::FUNCTIONS),
        (DatabaseType::PostgreSQL, ObjectKind::Script) => Some(postgres::SCRIPTS),
        (DatabaseType::MySQL, ObjectKind::Schema) => Some(mysql::SCHEMAS),
        (DatabaseType::MySQL, ObjectKind::Table) => Some(mysql::TABLES),
        (DatabaseType::MySQL, ObjectKind::View) => Some(mysql::VIEWS),
        (DatabaseType::MySQL, ObjectKind::Function) => Some(mysql::FUNCTIONS),
        (DatabaseType::MySQL, ObjectKind::Script) => Some(mysql::SCRIPTS),
        (DatabaseType::SQLite, ObjectKind::Schema) => Some(sqlite::SCHEMAS),
        (DatabaseType::SQLite, ObjectKind::Table) => Some(sqlite::TABLES),
        (DatabaseType::SQLite, ObjectKind::View) => Some(sqlite::VIEWS),
        (DatabaseType::SQLite, ObjectKind::Function | ObjectKind::Script) => None,
    }
}

pub fn columns(dialect: DatabaseType) -> &'static str {
    match dialect {
        DatabaseType::PostgreSQL => postgres::COLUMNS,
        DatabaseType::MySQL => mysql::COLUMNS,
        DatabaseType::SQLite => sqlite::COLUMNS,
    }
}

pub fn foreign_keys(dialect: DatabaseType) -> &'static str {
    match dialect {
        DatabaseType::PostgreSQL => postgres::FOREIGN_KEYS,
        DatabaseType::MySQL => mysql::FOREIGN_KEYS,
        DatabaseType::SQLite => sqlite::FOREIGN_KEYS,
    }
}

pub fn parameters(dialect: DatabaseType) -> Option<&'static str> {
    match dialect {
        DatabaseType::PostgreSQL => Some(postgres::PARAMETERS),
        DatabaseType::MySQL => Some(mysql::PARAMETERS),
        DatabaseType::SQLite => None,
    }
}
