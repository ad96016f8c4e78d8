use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params_from_iter};

use gatehouse_api::db::{self, migrations::MIGRATIONS};
use gatehouse_api::store::{NewUser, RegistrationTx, StoreError, User, UserStore};

use crate::config::DatabaseTarget;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type SqlitePool = Pool<SqliteConnectionManager>;
type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Shared database state: an r2d2 pool of SQLite connections.
///
/// rusqlite is blocking, so every statement runs on tokio's blocking pool.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

/// Open the database, apply pragmas and migrations, and fill the pool.
///
/// `:memory:` databases are private to one connection, so they always get a
/// pool of one that is never recycled.
pub fn init_db(target: &DatabaseTarget, pool_size: usize) -> Result<Db> {
    let (manager, size) = match target {
        DatabaseTarget::Memory => (SqliteConnectionManager::memory(), 1),
        DatabaseTarget::File(path) => {
            create_parent_dir(path)?;
            (SqliteConnectionManager::file(path), pool_size.max(1))
        }
    };
    let wal = matches!(target, DatabaseTarget::File(_));
    let manager = manager.with_init(move |conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        if wal {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")
    });

    let mut builder = SqlitePool::builder().max_size(u32::try_from(size).unwrap_or(u32::MAX));
    if !wal {
        builder = builder.max_lifetime(None).idle_timeout(None);
    }
    let pool = builder.build(manager).context("opening SQLite database")?;

    let conn = pool.get().context("checking out migration connection")?;
    run_migrations(&conn)?;

    Ok(Db { pool })
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating database directory {}", dir.display()))?;
    }
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Connection(format!("database task failed: {e}")))?
}

impl Db {
    /// Run `f` on a pooled connection off the async workers.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        blocking(move || {
            let conn = pool.get().map_err(pool_err)?;
            f(&conn)
        })
        .await
    }
}

// ── sea-query → rusqlite ───────────────────────────────────────────────────

fn bind_values(values: &sea_query::Values) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value as Sql;
    values
        .0
        .iter()
        .map(|v| match v {
            sea_query::Value::String(Some(s)) => Sql::Text(s.as_str().to_string()),
            sea_query::Value::Int(Some(i)) => Sql::Integer(i64::from(*i)),
            sea_query::Value::BigInt(Some(i)) => Sql::Integer(*i),
            sea_query::Value::Bool(Some(b)) => Sql::Integer(i64::from(*b)),
            _ => Sql::Null,
        })
        .collect()
}

fn pool_err(e: r2d2::Error) -> StoreError {
    StoreError::Connection(format!("connection pool: {e}"))
}

fn store_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) => match err.code {
            ErrorCode::ConstraintViolation => StoreError::Conflict(e.to_string()),
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure => StoreError::Connection(e.to_string()),
            _ => StoreError::Query(e.to_string()),
        },
        _ => StoreError::Query(e.to_string()),
    }
}

fn execute(conn: &Connection, sql: &str, values: &sea_query::Values) -> Result<usize, StoreError> {
    conn.prepare_cached(sql)
        .and_then(|mut stmt| stmt.execute(params_from_iter(bind_values(values))))
        .map_err(store_err)
}

fn query_id(
    conn: &Connection,
    sql: &str,
    values: &sea_query::Values,
) -> Result<Option<i64>, StoreError> {
    conn.prepare_cached(sql)
        .and_then(|mut stmt| {
            stmt.query_row(params_from_iter(bind_values(values)), |row| row.get(0))
                .optional()
        })
        .map_err(store_err)
}

fn query_user(
    conn: &Connection,
    sql: &str,
    values: &sea_query::Values,
) -> Result<Option<User>, StoreError> {
    conn.prepare_cached(sql)
        .and_then(|mut stmt| {
            stmt.query_row(params_from_iter(bind_values(values)), |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_digest: row.get(2)?,
                    invite_code_id: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .optional()
        })
        .map_err(store_err)
}

fn insert_returning_id(
    conn: &Connection,
    sql: &str,
    values: &sea_query::Values,
) -> Result<i64, StoreError> {
    execute(conn, sql, values)?;
    Ok(conn.last_insert_rowid())
}

// ── UserStore ──────────────────────────────────────────────────────────────

impl UserStore for Db {
    type Tx = SqliteTx;

    async fn begin(&self) -> Result<SqliteTx, StoreError> {
        let pool = self.pool.clone();
        let conn = blocking(move || {
            let conn = TxConn(pool.get().map_err(pool_err)?);
            conn.0.execute_batch("BEGIN IMMEDIATE").map_err(store_err)?;
            Ok(conn)
        })
        .await?;
        Ok(SqliteTx { conn: Some(conn) })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let (sql, values) = db::users::get_by_email(email);
        self.with_conn(move |conn| query_user(conn, &sql, &values))
            .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let (sql, values) = db::users::get_by_id(id);
        self.with_conn(move |conn| query_user(conn, &sql, &values))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(store_err)
        })
        .await
    }
}

/// Pooled connection holding an open transaction.
///
/// Rolls back on drop unless the transaction already ended, wherever the drop
/// happens (including inside an abandoned blocking task).
struct TxConn(PooledConn);

impl Drop for TxConn {
    fn drop(&mut self) {
        if self.0.is_autocommit() {
            return;
        }
        if let Err(e) = self.0.execute_batch("ROLLBACK") {
            tracing::warn!("rollback failed: {e}");
        }
    }
}

/// Write transaction on one pooled connection.
///
/// Dropping it before [`RegistrationTx::commit`] rolls back.
pub struct SqliteTx {
    conn: Option<TxConn>,
}

impl SqliteTx {
    /// Move the connection onto the blocking pool for one statement.
    async fn run<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StoreError::Connection("transaction connection lost".into()))?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&conn.0);
            (conn, result)
        })
        .await
        .map_err(|e| StoreError::Connection(format!("database task failed: {e}")))?;
        self.conn = Some(conn);
        result
    }
}

impl RegistrationTx for SqliteTx {
    async fn user_id_by_email(&mut self, email: &str) -> Result<Option<i64>, StoreError> {
        let (sql, values) = db::users::id_by_email(email);
        self.run(move |conn| query_id(conn, &sql, &values)).await
    }

    async fn active_invite_code_id(&mut self, code: &str) -> Result<Option<i64>, StoreError> {
        let (sql, values) = db::invite_codes::active_id_by_code(code);
        self.run(move |conn| query_id(conn, &sql, &values)).await
    }

    async fn invite_code_id(&mut self, code: &str) -> Result<Option<i64>, StoreError> {
        let (sql, values) = db::invite_codes::id_by_code(code);
        self.run(move |conn| query_id(conn, &sql, &values)).await
    }

    async fn insert_invite_code(&mut self, code: &str) -> Result<i64, StoreError> {
        let (sql, values) = db::invite_codes::insert(code);
        self.run(move |conn| insert_returning_id(conn, &sql, &values))
            .await
    }

    async fn insert_user(&mut self, user: NewUser<'_>) -> Result<i64, StoreError> {
        let (sql, values) = db::users::insert(user);
        self.run(move |conn| insert_returning_id(conn, &sql, &values))
            .await
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.run(|conn| conn.execute_batch("COMMIT").map_err(store_err))
            .await
    }
}
