//! Shape checks on the connection descriptor and the schema declaration.
//!
//! Everything here runs before the driver is touched. Loosely-typed input
//! (JSON, or YAML converted to JSON) is turned into the typed declaration;
//! already-typed input only has its names checked.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
  descriptor::ConnectionDescriptor,
  schema::{IndexFunction, IndexSpec, SchemaDeclaration, TableOptions, TableSpec},
};

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ConfigError {
  #[error("connection must be an object, got {0}")]
  ConnectionNotObject(&'static str),

  #[error("connection must have a non-empty string `database` property; tables are never added to a default database")]
  MissingDatabase,

  #[error("schema must be an array, got {0}")]
  SchemaNotArray(&'static str),

  #[error("schema[{index}]: table entry must be a string or an object, got {got}")]
  InvalidTableEntry { index: usize, got: &'static str },

  #[error("schema[{index}]: table entry must have a non-empty string `name`")]
  MissingTableName { index: usize },

  #[error("table `{table}`: `indexes` must be an array, got {got}")]
  IndexesNotArray { table: String, got: &'static str },

  #[error("table `{table}`, indexes[{index}]: index entry must be a string or an object, got {got}")]
  InvalidIndexEntry {
    table: String,
    index: usize,
    got: &'static str,
  },

  #[error("table `{table}`, indexes[{index}]: index entry must have a non-empty string `name`")]
  MissingIndexName { table: String, index: usize },
}

pub(crate) fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
  value.and_then(|x| x.as_str()).filter(|x| !x.is_empty())
}

pub fn parse_connection(value: &Value) -> Result<ConnectionDescriptor, ConfigError> {
  let obj = value
    .as_object()
    .ok_or_else(|| ConfigError::ConnectionNotObject(type_name(value)))?;

  // `db` is the older spelling of the same key. Null counts as absent.
  let database = obj
    .get("database")
    .filter(|x| !x.is_null())
    .or_else(|| obj.get("db"));
  let database = non_empty_str(database)
    .ok_or(ConfigError::MissingDatabase)?
    .to_string();

  let params: Map<String, Value> = obj
    .iter()
    .filter(|(k, _)| k.as_str() != "database" && k.as_str() != "db")
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect();
  Ok(ConnectionDescriptor::from_parts(database, params))
}

pub fn parse_schema(value: &Value) -> Result<SchemaDeclaration, ConfigError> {
  let entries = value
    .as_array()
    .ok_or_else(|| ConfigError::SchemaNotArray(type_name(value)))?;
  let tables = entries
    .iter()
    .enumerate()
    .map(|(i, x)| parse_table(i, x))
    .collect::<Result<Vec<_>, _>>()?;
  Ok(SchemaDeclaration::new(tables))
}

fn parse_table(index: usize, value: &Value) -> Result<TableSpec, ConfigError> {
  let obj = match value {
    Value::String(name) if name.is_empty() => return Err(ConfigError::MissingTableName { index }),
    Value::String(name) => return Ok(TableSpec::new(name.as_str())),
    Value::Object(x) => x,
    _ => {
      return Err(ConfigError::InvalidTableEntry {
        index,
        got: type_name(value),
      })
    }
  };

  let name = non_empty_str(obj.get("name"))
    .ok_or(ConfigError::MissingTableName { index })?
    .to_string();
  let options = pick_table_options(obj);

  let indexes = match obj.get("indexes") {
    None => None,
    Some(Value::Array(entries)) => Some(
      entries
        .iter()
        .enumerate()
        .map(|(i, x)| parse_index(&name, i, x))
        .collect::<Result<Vec<_>, _>>()?,
    ),
    Some(x) => {
      return Err(ConfigError::IndexesNotArray {
        table: name,
        got: type_name(x),
      })
    }
  };

  Ok(TableSpec {
    name,
    options,
    indexes,
  })
}

/// Keeps the known option keys and drops the rest. Values are not
/// inspected here.
fn pick_table_options(obj: &Map<String, Value>) -> TableOptions {
  let pick = |option: &str| obj.get(option).filter(|x| !x.is_null()).cloned();
  TableOptions {
    primary_key: pick("primaryKey"),
    durability: pick("durability"),
    shards: pick("shards"),
    replicas: pick("replicas"),
    primary_replica_tag: pick("primaryReplicaTag"),
  }
}

fn parse_index(table: &str, index: usize, value: &Value) -> Result<IndexSpec, ConfigError> {
  let obj = match value {
    Value::String(name) if name.is_empty() => {
      return Err(ConfigError::MissingIndexName {
        table: table.to_string(),
        index,
      })
    }
    Value::String(name) => return Ok(IndexSpec::new(name.as_str())),
    Value::Object(x) => x,
    _ => {
      return Err(ConfigError::InvalidIndexEntry {
        table: table.to_string(),
        index,
        got: type_name(value),
      })
    }
  };

  let name = non_empty_str(obj.get("name"))
    .ok_or_else(|| ConfigError::MissingIndexName {
      table: table.to_string(),
      index,
    })?
    .to_string();

  let pick = |option: &str| obj.get(option).filter(|x| !x.is_null()).cloned();
  Ok(IndexSpec {
    function: pick("indexFunction").map(IndexFunction),
    multi: pick("multi"),
    geo: pick("geo"),
    name,
  })
}

/// Checks a typed descriptor and declaration. The types already rule out
/// most malformed shapes, so only emptiness is left to catch.
pub fn validate(
  descriptor: &ConnectionDescriptor,
  schema: &SchemaDeclaration,
) -> Result<(), ConfigError> {
  if descriptor.database().is_empty() {
    return Err(ConfigError::MissingDatabase);
  }
  for (i, table) in schema.tables().iter().enumerate() {
    if table.name.is_empty() {
      return Err(ConfigError::MissingTableName { index: i });
    }
    for (j, index) in table.indexes.iter().flatten().enumerate() {
      if index.name.is_empty() {
        return Err(ConfigError::MissingIndexName {
          table: table.name.clone(),
          index: j,
        });
      }
    }
  }
  Ok(())
}
