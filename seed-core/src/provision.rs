//! Brings a database to the declared set of tables and indexes.
//!
//! Nothing is checked up front: every object is simply created, and a
//! creation that fails because the object is already there counts as done.
//! Running the same declaration twice, or concurrently from two processes,
//! therefore converges on the same state without a lock.

use futures::future::join_all;
use serde_json::Value;

use crate::{
  descriptor::ConnectionDescriptor,
  driver::{Connection, Driver},
  error::{DriverError, InitError},
  schema::{SchemaDeclaration, TableSpec},
  validate::{parse_connection, parse_schema, validate},
};

/// Runs the provisioning sequence over a driver it was built with. The
/// driver itself is only borrowed for `connect`.
pub struct Provisioner {
  driver: Box<dyn Driver>,
}

impl Provisioner {
  pub fn new(driver: Box<dyn Driver>) -> Self {
    Self { driver }
  }

  /// Ensures the database, tables and indexes exist and hands back the
  /// connection it used. The connection stays open.
  pub async fn initialize(
    &self,
    descriptor: &ConnectionDescriptor,
    schema: &SchemaDeclaration,
  ) -> Result<Box<dyn Connection>, InitError> {
    validate(descriptor, schema)?;
    let database = descriptor.database();

    log::info!(
      "Provisioning database `{}` on {} ({} tables).",
      database,
      descriptor.address(),
      schema.tables().len()
    );
    let conn = self.driver.connect(descriptor).await?;
    ensure_database(&*conn, database).await?;
    provision_tables(&*conn, database, schema.tables()).await?;
    Ok(conn)
  }

  /// Same as `initialize`, for loosely-typed input. Shape errors are
  /// reported before any connection is attempted.
  pub async fn initialize_value(
    &self,
    connection: &Value,
    schema: &Value,
  ) -> Result<Box<dyn Connection>, InitError> {
    let descriptor = parse_connection(connection)?;
    let schema = parse_schema(schema)?;
    self.initialize(&descriptor, &schema).await
  }
}

/// Passes `result` through unless it only reports an existing object.
pub fn tolerate_existing(result: Result<(), DriverError>) -> Result<(), DriverError> {
  match result {
    Err(e) if e.is_already_exists() => {
      log::debug!("{}", e);
      Ok(())
    }
    x => x,
  }
}

pub async fn ensure_database(conn: &dyn Connection, database: &str) -> Result<(), DriverError> {
  tolerate_existing(conn.create_database(database).await)
}

/// Drives every result to completion, then reports the first failure in
/// declaration order. Later failures are only logged.
fn first_error<I>(results: I) -> Result<(), DriverError>
where
  I: IntoIterator<Item = Result<(), DriverError>>,
{
  let mut first = None;
  for e in results.into_iter().filter_map(|x| x.err()) {
    if first.is_none() {
      first = Some(e);
    } else {
      log::error!("Additional provisioning failure: {}", e);
    }
  }
  match first {
    Some(e) => Err(e),
    None => Ok(()),
  }
}

pub async fn provision_tables(
  conn: &dyn Connection,
  database: &str,
  tables: &[TableSpec],
) -> Result<(), DriverError> {
  first_error(
    join_all(
      tables
        .iter()
        .map(|table| provision_table(conn, database, table)),
    )
    .await,
  )
}

pub async fn provision_table(
  conn: &dyn Connection,
  database: &str,
  table: &TableSpec,
) -> Result<(), DriverError> {
  tolerate_existing(
    conn
      .create_table(database, &table.name, &table.options)
      .await,
  )?;

  let indexes = match &table.indexes {
    Some(x) => x,
    None => {
      log::info!("Table `{}.{}` ready.", database, table.name);
      return Ok(());
    }
  };

  first_error(
    join_all(indexes.iter().map(|index| async move {
      let definition = index.definition();
      tolerate_existing(
        conn
          .create_index(database, &table.name, &definition)
          .await,
      )
    }))
    .await,
  )?;

  conn.wait_for_indexes(database, &table.name).await?;
  log::info!(
    "Table `{}.{}` ready with {} indexes.",
    database,
    table.name,
    indexes.len()
  );
  Ok(())
}
