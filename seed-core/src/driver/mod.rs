use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  descriptor::ConnectionDescriptor,
  error::{ConnectionError, DriverError, ErrorKind},
  schema::{IndexDefinition, IndexFunction, Replicas, TableOptions},
};

pub mod memory;
pub mod term;

#[cfg(feature = "sqlite-driver")]
pub mod sqlite;

#[cfg(test)]
mod memory_test;


/// Something that can open sessions to a database server.
#[async_trait]
pub trait Driver: Send + Sync {
  async fn connect(
    &self,
    descriptor: &ConnectionDescriptor,
  ) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// An open session. Requests may be issued concurrently over one session.
#[async_trait]
pub trait Connection: Send + Sync {
  async fn create_database(&self, name: &str) -> Result<(), DriverError>;

  async fn create_table(
    &self,
    database: &str,
    name: &str,
    options: &TableOptions,
  ) -> Result<(), DriverError>;

  async fn create_index(
    &self,
    database: &str,
    table: &str,
    index: &IndexDefinition,
  ) -> Result<(), DriverError>;

  /// Resolves once every index of the table has finished building.
  async fn wait_for_indexes(&self, database: &str, table: &str) -> Result<(), DriverError>;

  async fn list_databases(&self) -> Result<Vec<String>, DriverError>;

  async fn list_tables(&self, database: &str) -> Result<Vec<String>, DriverError>;

  async fn list_indexes(&self, database: &str, table: &str) -> Result<Vec<String>, DriverError>;

  async fn table_config(&self, database: &str, table: &str) -> Result<TableConfig, DriverError>;

  async fn index_status(&self, database: &str, table: &str)
    -> Result<Vec<IndexStatus>, DriverError>;

  fn is_open(&self) -> bool;
}

pub const DEFAULT_PRIMARY_KEY: &str = "id";
pub const DEFAULT_DURABILITY: &str = "hard";

/// The configuration a table actually ended up with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
  pub name: String,
  pub primary_key: String,
  pub durability: String,
  pub shards: u64,
  pub replicas: Replicas,
  pub primary_replica_tag: Option<String>,
}

impl TableConfig {
  /// Applies defaults and rejects option values no server would accept.
  pub fn from_options(name: &str, options: &TableOptions) -> Result<Self, DriverError> {
    let durability = string_option("durability", &options.durability)?
      .unwrap_or_else(|| DEFAULT_DURABILITY.to_string());
    if durability != "hard" && durability != "soft" {
      return Err(DriverError::new(
        ErrorKind::QueryLogic,
        format!(
          "Durability option `{}` unrecognized (options are \"hard\" and \"soft\").",
          durability
        ),
      ));
    }

    let shards = match &options.shards {
      None => 1,
      Some(x) => x.as_u64().ok_or_else(|| wrong_type("shards", "a non-negative integer", x))?,
    };
    if shards == 0 || shards > 64 {
      return Err(DriverError::new(
        ErrorKind::QueryLogic,
        "Every table must have at least one shard and at most 64.",
      ));
    }

    let replicas = match &options.replicas {
      None => Replicas::Count(1),
      Some(x) => serde_json::from_value(x.clone()).map_err(|_| {
        wrong_type(
          "replicas",
          "a non-negative integer or an OBJECT of them",
          x,
        )
      })?,
    };
    let primary_replica_tag = string_option("primaryReplicaTag", &options.primary_replica_tag)?;
    if let Replicas::PerTag(_) = &replicas {
      if primary_replica_tag.is_none() {
        return Err(DriverError::new(
          ErrorKind::QueryLogic,
          "`primaryReplicaTag` must be specified when `replicas` is an OBJECT.",
        ));
      }
    }

    Ok(Self {
      name: name.to_string(),
      primary_key: string_option("primaryKey", &options.primary_key)?
        .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string()),
      durability,
      shards,
      replicas,
      primary_replica_tag,
    })
  }
}

/// Value type names as the server spells them in errors.
fn reql_type(value: &Value) -> &'static str {
  match value {
    Value::Null => "NULL",
    Value::Bool(_) => "BOOL",
    Value::Number(_) => "NUMBER",
    Value::String(_) => "STRING",
    Value::Array(_) => "ARRAY",
    Value::Object(_) => "OBJECT",
  }
}

fn wrong_type(option: &str, expected: &str, found: &Value) -> DriverError {
  DriverError::new(
    ErrorKind::QueryLogic,
    format!(
      "Expected {} for option `{}` but found {}.",
      expected,
      option,
      reql_type(found)
    ),
  )
}

fn string_option(option: &str, value: &Option<Value>) -> Result<Option<String>, DriverError> {
  match value {
    None => Ok(None),
    Some(Value::String(x)) => Ok(Some(x.clone())),
    Some(x) => Err(wrong_type(option, "a STRING", x)),
  }
}

/// Index flags must be booleans when present.
pub fn check_index_options(index: &IndexDefinition) -> Result<(), DriverError> {
  let options = match &index.options {
    Some(x) => x,
    None => return Ok(()),
  };
  for &(option, value) in &[("multi", &options.multi), ("geo", &options.geo)] {
    match value {
      None | Some(Value::Bool(_)) => {}
      Some(x) => return Err(wrong_type(option, "a BOOL", x)),
    }
  }
  Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
  pub index: String,
  pub ready: bool,
  pub multi: bool,
  pub geo: bool,
  pub function: Option<IndexFunction>,
}

/// Database, table and index names share one rule: letters, digits and
/// underscores, starting with a letter or underscore.
pub fn check_name(what: &str, name: &str) -> Result<(), DriverError> {
  let valid = name.len() <= 127
    && name
      .chars()
      .next()
      .map(|c| c.is_ascii_alphabetic() || c == '_')
      .unwrap_or(false)
    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
  if valid {
    Ok(())
  } else {
    Err(DriverError::new(
      ErrorKind::QueryLogic,
      format!(
        "{} name `{}` invalid (Use A-Z, a-z, 0-9 and _ only).",
        what, name
      ),
    ))
  }
}
