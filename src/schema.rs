//! Startup schema reconciliation
//! -----------------------------
//! Best-effort corrective DDL run once at process start, before the HTTP
//! listener binds. The reconciler inspects the live catalog for the expected
//! "Users" and "Courses" tables and patches drift: tables and columns whose
//! names differ only in case are renamed, missing columns are added with
//! safe defaults, and a wholly missing Courses table is created from
//! scratch.
//!
//! Invariants:
//! - Never drops a table or column, never retypes, never touches row data.
//! - Each column resolves through exactly one of no-op, rename, or add, in
//!   that priority order; rename wins over add so legacy data survives.
//! - Any failure anywhere inside is caught at the `ensure_schema` boundary,
//!   logged, and swallowed. Each DDL statement commits on its own, so a
//!   rerun on the next startup picks up where a failed run stopped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tracing::{error, info};

use crate::ident::quote_ident;

/// Narrow view of the live connection consumed by the reconciler: one
/// single-value catalog lookup and one DDL execution. Tests drive the
/// reconciler through a scripted implementation of this trait.
#[async_trait]
pub trait CatalogConn: Send + Sync {
    /// Run a catalog query returning at most one text value. Values are
    /// bound as parameters; identifiers never travel through `params`.
    async fn query_name(&self, sql: &str, params: &[&str]) -> Result<Option<String>>;
    /// Execute a single DDL statement.
    async fn execute(&self, sql: &str) -> Result<()>;
}

#[async_trait]
impl CatalogConn for tokio_postgres::Client {
    async fn query_name(&self, sql: &str, params: &[&str]) -> Result<Option<String>> {
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let row = self.query_opt(sql, &bound).await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        // Simple protocol: DDL carries no bound parameters.
        self.batch_execute(sql).await?;
        Ok(())
    }
}

/// How a single expected column is brought into existence.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    /// Exact-cased name the application queries use.
    pub name: &'static str,
    /// Lowercase legacy name treated as a rename source, if any.
    pub rename_from: Option<&'static str>,
    /// Type-and-default clause used only when the column must be added
    /// outright. NOT NULL clauses carry a default so existing rows stay
    /// valid.
    pub add_clause: Option<&'static str>,
}

/// Expected shape of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    /// Lowercase legacy table name treated as a rename source.
    pub rename_from: &'static str,
    /// Create script used only when the table is entirely absent. Tables
    /// without one are never created by the reconcile pass.
    pub create_sql: Option<&'static str>,
    pub columns: &'static [ColumnSpec],
}

const CREATE_USERS_SQL: &str = r#"CREATE TABLE "Users" (
    "Id" serial PRIMARY KEY,
    "Name" text NOT NULL,
    "Email" text NOT NULL UNIQUE,
    "PasswordHash" text NOT NULL,
    "Phone" text NOT NULL,
    "Gender" text NOT NULL,
    "RegistrationDate" timestamp with time zone NOT NULL DEFAULT (now() at time zone 'utc'),
    "LastLogin" timestamp with time zone NULL,
    "IsActive" boolean NOT NULL DEFAULT true
);"#;

const CREATE_COURSES_SQL: &str = r#"CREATE TABLE "Courses" (
    "Id" serial PRIMARY KEY,
    "CourseName" text NOT NULL,
    "Description" text NOT NULL,
    "CreatedAt" timestamp with time zone NOT NULL DEFAULT (now() at time zone 'utc')
);"#;

// Id through Gender are expected to pre-exist whenever the table does, so
// they carry no add clause and stay missing if absent.
const USERS_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "Id", rename_from: Some("id"), add_clause: None },
    ColumnSpec { name: "Name", rename_from: Some("name"), add_clause: None },
    ColumnSpec { name: "Email", rename_from: Some("email"), add_clause: None },
    ColumnSpec { name: "Phone", rename_from: Some("phone"), add_clause: None },
    ColumnSpec { name: "Gender", rename_from: Some("gender"), add_clause: None },
    ColumnSpec { name: "PasswordHash", rename_from: Some("password"), add_clause: Some("text NOT NULL DEFAULT ''") },
    ColumnSpec {
        name: "RegistrationDate",
        rename_from: None,
        add_clause: Some("timestamp with time zone NOT NULL DEFAULT (now() at time zone 'utc')"),
    },
    ColumnSpec { name: "LastLogin", rename_from: None, add_clause: Some("timestamp with time zone NULL") },
    ColumnSpec { name: "IsActive", rename_from: None, add_clause: Some("boolean NOT NULL DEFAULT true") },
];

const COURSES_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "Id", rename_from: Some("id"), add_clause: Some("serial PRIMARY KEY") },
    ColumnSpec { name: "CourseName", rename_from: Some("coursename"), add_clause: Some("text NOT NULL DEFAULT ''") },
    ColumnSpec { name: "Description", rename_from: Some("description"), add_clause: Some("text NOT NULL DEFAULT ''") },
    ColumnSpec {
        name: "CreatedAt",
        rename_from: Some("createdat"),
        add_clause: Some("timestamp with time zone NOT NULL DEFAULT (now() at time zone 'utc')"),
    },
];

pub fn users_table() -> TableSpec {
    TableSpec { name: "Users", rename_from: "users", create_sql: None, columns: USERS_COLUMNS }
}

pub fn courses_table() -> TableSpec {
    TableSpec { name: "Courses", rename_from: "courses", create_sql: Some(CREATE_COURSES_SQL), columns: COURSES_COLUMNS }
}

// --- Catalog lookups (read-only, one parameterized query each) ---

async fn find_table_exact(conn: &dyn CatalogConn, name: &str) -> Result<Option<String>> {
    conn.query_name(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_name = $1 LIMIT 1",
        &[name],
    )
    .await
}

async fn find_table_ci(conn: &dyn CatalogConn, lower_name: &str) -> Result<Option<String>> {
    conn.query_name(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'public' AND lower(table_name) = lower($1) LIMIT 1",
        &[lower_name],
    )
    .await
}

async fn find_column_exact(conn: &dyn CatalogConn, table: &str, name: &str) -> Result<Option<String>> {
    conn.query_name(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2 LIMIT 1",
        &[table, name],
    )
    .await
}

async fn find_column_ci(conn: &dyn CatalogConn, table: &str, lower_name: &str) -> Result<Option<String>> {
    conn.query_name(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 AND lower(column_name) = lower($2) LIMIT 1",
        &[table, lower_name],
    )
    .await
}

// --- Corrective DDL ---

/// Guarantee one expected column exists on `table`, preferring rename over
/// add so data in a legacy column survives. Exactly one of no-op, rename,
/// or add happens per call; a column with neither a rename candidate nor an
/// add clause is left missing.
async fn reconcile_column(conn: &dyn CatalogConn, table: &str, spec: &ColumnSpec) -> Result<()> {
    if find_column_exact(conn, table, spec.name).await?.is_some() {
        return Ok(());
    }
    if let Some(legacy) = spec.rename_from {
        if let Some(from) = find_column_ci(conn, table, legacy).await? {
            let sql = format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {};",
                quote_ident(table),
                quote_ident(&from),
                quote_ident(spec.name)
            );
            conn.execute(&sql)
                .await
                .with_context(|| format!("renaming column {} to {} on {}", from, spec.name, table))?;
            info!(target: "schema", "renamed column {} to {} on {}", from, spec.name, table);
            return Ok(());
        }
    }
    if let Some(clause) = spec.add_clause {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {};",
            quote_ident(table),
            quote_ident(spec.name),
            clause
        );
        conn.execute(&sql)
            .await
            .with_context(|| format!("adding column {} on {}", spec.name, table))?;
        info!(target: "schema", "added column {} on {}", spec.name, table);
    }
    Ok(())
}

/// Resolve the canonical table name, renaming a case-variant legacy table
/// when one exists. Returns None when no candidate exists in any casing.
async fn resolve_table(conn: &dyn CatalogConn, spec: &TableSpec) -> Result<Option<String>> {
    if let Some(name) = find_table_exact(conn, spec.name).await? {
        return Ok(Some(name));
    }
    if let Some(existing) = find_table_ci(conn, spec.rename_from).await? {
        if existing != spec.name {
            let sql = format!("ALTER TABLE {} RENAME TO {};", quote_ident(&existing), quote_ident(spec.name));
            conn.execute(&sql)
                .await
                .with_context(|| format!("renaming table {} to {}", existing, spec.name))?;
            info!(target: "schema", "renamed table {} to {}", existing, spec.name);
        }
        return Ok(Some(spec.name.to_string()));
    }
    Ok(None)
}

/// Resolve-or-create one table, then bring its columns into shape. A table
/// created fresh from its script is already in final shape, so the
/// per-column pass is skipped for it.
async fn reconcile_table(conn: &dyn CatalogConn, spec: &TableSpec) -> Result<()> {
    let table = match resolve_table(conn, spec).await? {
        Some(t) => t,
        None => match spec.create_sql {
            Some(sql) => {
                conn.execute(sql).await.with_context(|| format!("creating table {}", spec.name))?;
                info!(target: "schema", "created table {}", spec.name);
                return Ok(());
            }
            None => return Ok(()),
        },
    };
    for col in spec.columns {
        reconcile_column(conn, &table, col).await?;
    }
    Ok(())
}

/// Baseline create-if-missing for the declared model: when no model table
/// exists in any casing the full schema is created outright. An existing
/// partial schema is left to the reconcile pass instead.
pub async fn ensure_created(conn: &dyn CatalogConn) -> Result<()> {
    for spec in [users_table(), courses_table()] {
        if find_table_ci(conn, spec.rename_from).await?.is_some() {
            return Ok(());
        }
    }
    conn.execute(CREATE_USERS_SQL).await.context("creating table Users")?;
    conn.execute(CREATE_COURSES_SQL).await.context("creating table Courses")?;
    info!(target: "schema", "created baseline schema (Users, Courses)");
    Ok(())
}

/// The reconcile pass proper: normalize Users, then Courses. When the Users
/// table is absent in any casing this is a fresh database with nothing to
/// normalize, and the whole pass returns without issuing any DDL.
pub async fn reconcile_tables(conn: &dyn CatalogConn) -> Result<()> {
    let users = users_table();
    let Some(users_name) = resolve_table(conn, &users).await? else {
        return Ok(());
    };
    for col in users.columns {
        reconcile_column(conn, &users_name, col).await?;
    }
    reconcile_table(conn, &courses_table()).await?;
    Ok(())
}

/// Fallible body of `ensure_schema`: baseline create, then the reconcile
/// pass, sequentially on the one connection.
pub async fn reconcile_all(conn: &dyn CatalogConn) -> Result<()> {
    ensure_created(conn).await?;
    reconcile_tables(conn).await?;
    Ok(())
}

/// Run the full best-effort reconciliation. Every failure inside (catalog
/// query or DDL execution) is logged with its source chain and swallowed
/// here; startup proceeds regardless of the outcome.
pub async fn ensure_schema(conn: &dyn CatalogConn) {
    if let Err(e) = reconcile_all(conn).await {
        error!(target: "schema", "schema check/repair failed: {:#}", e);
    }
}
