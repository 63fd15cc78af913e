//! Result database schema. Each step moves the database one version forward;
//! the reached version is kept in the single-row `schema_version` table.

use rusqlite::{params, Connection, OptionalExtension};

use super::ResultDbError;

/// How a schema step changes the database.
enum Change {
    /// Runs a SQL script.
    Script(&'static str),
    /// Adds a nullable column unless a database created before the step
    /// already has it.
    Column {
        table: &'static str,
        column: &'static str,
        sql_type: &'static str,
    },
}

struct SchemaStep {
    version: u32,
    name: &'static str,
    change: Change,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "results",
        change: Change::Script(include_str!("sql/001_create_results.sql")),
    },
    SchemaStep {
        version: 2,
        name: "errors",
        change: Change::Script(include_str!("sql/002_create_errors.sql")),
    },
    SchemaStep {
        version: 3,
        name: "pipeline_config",
        change: Change::Script(include_str!("sql/003_create_pipeline_config.sql")),
    },
    SchemaStep {
        version: 4,
        name: "results.label",
        change: Change::Column {
            table: "results",
            column: "label",
            sql_type: "TEXT",
        },
    },
];

/// Version a fully upgraded database reports.
pub fn latest_version() -> u32 {
    STEPS.last().map(|step| step.version).unwrap_or(0)
}

/// The schema version recorded in the database, 0 when it was never upgraded.
pub fn current_version(conn: &Connection) -> Result<u32, ResultDbError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;
    let version = conn
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .optional()?;
    Ok(version.unwrap_or(0))
}

/// Applies every step above the recorded version inside one transaction and
/// returns the version reached. A database written by a newer build is
/// refused rather than downgraded.
pub fn upgrade(conn: &mut Connection) -> Result<u32, ResultDbError> {
    let found = current_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(ResultDbError::SchemaTooNew { found, supported });
    }
    if found == supported {
        return Ok(found);
    }

    let tx = conn.transaction()?;
    for step in STEPS.iter().filter(|step| step.version > found) {
        log::info!("Applying result schema step {} ({})", step.version, step.name);
        apply(&tx, step).map_err(|source| ResultDbError::SchemaStep {
            version: step.version,
            name: step.name,
            source,
        })?;
    }
    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![supported],
    )?;
    tx.commit()?;

    log::info!("Result schema upgraded from version {} to {}", found, supported);
    Ok(supported)
}

fn apply(conn: &Connection, step: &SchemaStep) -> Result<(), rusqlite::Error> {
    match step.change {
        Change::Script(sql) => conn.execute_batch(sql),
        Change::Column {
            table,
            column,
            sql_type,
        } => {
            if has_column(conn, table, column)? {
                log::debug!("Column {}.{} already present", table, column);
                return Ok(());
            }
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                table, column, sql_type
            ))
        }
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, rusqlite::Error> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
