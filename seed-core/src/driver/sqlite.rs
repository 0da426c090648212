use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, ErrorCode, OptionalExtension};

use super::{
  check_index_options, check_name, term, Connection, Driver, IndexStatus, TableConfig,
};
use crate::{
  descriptor::ConnectionDescriptor,
  error::{ConnectionError, DriverError, ErrorKind},
  schema::{IndexDefinition, TableOptions},
};

const CATALOG: &str = r#"
create table if not exists seed_databases (
  name text primary key
);
create table if not exists seed_tables (
  db text not null,
  name text not null,
  config text not null,
  primary key (db, name)
);
create table if not exists seed_indexes (
  db text not null,
  tbl text not null,
  name text not null,
  definition text not null,
  built integer not null default 0,
  primary key (db, tbl, name)
);
"#;

/// Keeps the catalog of databases, tables and indexes in one SQLite file.
pub struct SqliteDriver {
  path: String,
  pool: Pool<SqliteConnectionManager>,
}

pub struct SqliteConnection {
  pool: Pool<SqliteConnectionManager>,
}

impl SqliteDriver {
  pub fn open(path: &str) -> Result<Self> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
      c.busy_timeout(Duration::from_secs(5))?;
      c.execute_batch(CATALOG)
    });
    Ok(Self {
      path: path.to_string(),
      pool: Pool::new(manager)?,
    })
  }
}

#[async_trait]
impl Driver for SqliteDriver {
  async fn connect(
    &self,
    _descriptor: &ConnectionDescriptor,
  ) -> Result<Box<dyn Connection>, ConnectionError> {
    let pool = self.pool.clone();
    let checked = tokio::task::spawn_blocking(move || pool.get().map(drop))
      .await
      .map_err(|e| ConnectionError::new(&self.path, e.to_string()))?;
    checked.map_err(|e| ConnectionError::new(&self.path, e.to_string()))?;
    log::debug!("Opened SQLite catalog at {}.", self.path);
    Ok(Box::new(SqliteConnection {
      pool: self.pool.clone(),
    }))
  }
}

fn sql_error(e: rusqlite::Error) -> DriverError {
  DriverError::new(ErrorKind::Internal, e.to_string())
}

fn json_error(e: serde_json::Error) -> DriverError {
  DriverError::new(ErrorKind::Internal, e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

/// Runs an insert, turning a key collision into a creation conflict.
fn insert_or_conflict(result: rusqlite::Result<usize>, conflict: String) -> Result<(), DriverError> {
  match result {
    Ok(_) => Ok(()),
    Err(e) if is_constraint_violation(&e) => Err(DriverError::new(ErrorKind::OpFailed, conflict)),
    Err(e) => Err(sql_error(e)),
  }
}

fn require_database(c: &rusqlite::Connection, db: &str) -> Result<(), DriverError> {
  c.query_row(
    "select 1 from seed_databases where name = ?1",
    params![db],
    |_| Ok(()),
  )
  .optional()
  .map_err(sql_error)?
  .ok_or_else(|| {
    DriverError::new(
      ErrorKind::OpFailed,
      format!("Database `{}` does not exist.", db),
    )
  })
}

fn require_table(c: &rusqlite::Connection, db: &str, table: &str) -> Result<(), DriverError> {
  require_database(c, db)?;
  c.query_row(
    "select 1 from seed_tables where db = ?1 and name = ?2",
    params![db, table],
    |_| Ok(()),
  )
  .optional()
  .map_err(sql_error)?
  .ok_or_else(|| {
    DriverError::new(
      ErrorKind::OpFailed,
      format!("Table `{}.{}` does not exist.", db, table),
    )
  })
}

impl SqliteConnection {
  async fn run<T, F>(&self, work: F) -> Result<T, DriverError>
  where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, DriverError> + Send + 'static,
  {
    let pool = self.pool.clone();
    tokio::task::spawn_blocking(move || {
      let conn = pool
        .get()
        .map_err(|e| DriverError::new(ErrorKind::Availability, e.to_string()))?;
      work(&conn)
    })
    .await
    .map_err(|e| DriverError::new(ErrorKind::Internal, e.to_string()))?
  }

  fn names(c: &rusqlite::Connection, sql: &str, args: &[&str]) -> Result<Vec<String>, DriverError> {
    let mut stmt = c.prepare(sql).map_err(sql_error)?;
    let rows = stmt
      .query_map(rusqlite::params_from_iter(args.iter()), |row| row.get(0))
      .map_err(sql_error)?;
    rows.collect::<rusqlite::Result<Vec<String>>>().map_err(sql_error)
  }
}

#[async_trait]
impl Connection for SqliteConnection {
  async fn create_database(&self, name: &str) -> Result<(), DriverError> {
    check_name("Database", name)?;
    let name = name.to_string();
    self
      .run(move |c| {
        insert_or_conflict(
          c.execute("insert into seed_databases (name) values (?1)", params![name]),
          format!("Database `{}` already exists.", name),
        )
      })
      .await
  }

  async fn create_table(
    &self,
    database: &str,
    name: &str,
    options: &TableOptions,
  ) -> Result<(), DriverError> {
    check_name("Table", name)?;
    let config = TableConfig::from_options(name, options)?;
    let config = serde_json::to_string(&config).map_err(json_error)?;
    let (db, name) = (database.to_string(), name.to_string());
    self
      .run(move |c| {
        require_database(c, &db)?;
        insert_or_conflict(
          c.execute(
            "insert into seed_tables (db, name, config) values (?1, ?2, ?3)",
            params![db, name, config],
          ),
          format!("Table `{}.{}` already exists.", db, name),
        )
      })
      .await
  }

  async fn create_index(
    &self,
    database: &str,
    table: &str,
    index: &IndexDefinition,
  ) -> Result<(), DriverError> {
    check_name("Index", &index.name)?;
    check_index_options(index)?;
    if let Some(f) = &index.function {
      term::compile(f)?;
    }
    let definition = serde_json::to_string(index).map_err(json_error)?;
    let (db, table, name) = (database.to_string(), table.to_string(), index.name.clone());
    self
      .run(move |c| {
        require_table(c, &db, &table)?;
        insert_or_conflict(
          c.execute(
            "insert into seed_indexes (db, tbl, name, definition) values (?1, ?2, ?3, ?4)",
            params![db, table, name, definition],
          ),
          format!(
            "Index `{}` already exists on table `{}.{}`.",
            name, db, table
          ),
        )
      })
      .await
  }

  async fn wait_for_indexes(&self, database: &str, table: &str) -> Result<(), DriverError> {
    let (db, table) = (database.to_string(), table.to_string());
    self
      .run(move |c| {
        require_table(c, &db, &table)?;
        // Nothing is built in the background here; waiting completes the builds.
        c.execute(
          "update seed_indexes set built = 1 where db = ?1 and tbl = ?2",
          params![db, table],
        )
        .map_err(sql_error)?;
        Ok(())
      })
      .await
  }

  async fn list_databases(&self) -> Result<Vec<String>, DriverError> {
    self
      .run(|c| Self::names(c, "select name from seed_databases order by name", &[]))
      .await
  }

  async fn list_tables(&self, database: &str) -> Result<Vec<String>, DriverError> {
    let db = database.to_string();
    self
      .run(move |c| {
        require_database(c, &db)?;
        Self::names(
          c,
          "select name from seed_tables where db = ?1 order by name",
          &[&db],
        )
      })
      .await
  }

  async fn list_indexes(&self, database: &str, table: &str) -> Result<Vec<String>, DriverError> {
    let (db, table) = (database.to_string(), table.to_string());
    self
      .run(move |c| {
        require_table(c, &db, &table)?;
        Self::names(
          c,
          "select name from seed_indexes where db = ?1 and tbl = ?2 order by name",
          &[&db, &table],
        )
      })
      .await
  }

  async fn table_config(&self, database: &str, table: &str) -> Result<TableConfig, DriverError> {
    let (db, table) = (database.to_string(), table.to_string());
    self
      .run(move |c| {
        require_table(c, &db, &table)?;
        let config: String = c
          .query_row(
            "select config from seed_tables where db = ?1 and name = ?2",
            params![db, table],
            |row| row.get(0),
          )
          .map_err(sql_error)?;
        serde_json::from_str(&config).map_err(json_error)
      })
      .await
  }

  async fn index_status(
    &self,
    database: &str,
    table: &str,
  ) -> Result<Vec<IndexStatus>, DriverError> {
    let (db, table) = (database.to_string(), table.to_string());
    self
      .run(move |c| {
        require_table(c, &db, &table)?;
        let mut stmt = c
          .prepare(
            "select definition, built from seed_indexes where db = ?1 and tbl = ?2 order by name",
          )
          .map_err(sql_error)?;
        let rows = stmt
          .query_map(params![db, table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
          })
          .map_err(sql_error)?
          .collect::<rusqlite::Result<Vec<_>>>()
          .map_err(sql_error)?;

        rows
          .into_iter()
          .map(|(definition, built)| {
            let definition: IndexDefinition =
              serde_json::from_str(&definition).map_err(json_error)?;
            Ok(IndexStatus {
              ready: built,
              multi: definition.multi(),
              geo: definition.geo(),
              function: definition.function,
              index: definition.name,
            })
          })
          .collect()
      })
      .await
  }

  fn is_open(&self) -> bool {
    true
  }
}
