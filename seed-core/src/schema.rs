use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::iter::FromIterator;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validate::{parse_schema, ConfigError};

/// Table creation options understood by drivers. Anything else a caller puts
/// on a table entry is dropped before it reaches the driver. Values are kept
/// as given; the driver decides whether they are acceptable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub primary_key: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub durability: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shards: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub replicas: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub primary_replica_tag: Option<Value>,
}

impl TableOptions {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

/// Replica count, either in total or per server tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Replicas {
  Count(u64),
  PerTag(BTreeMap<String, u64>),
}

impl From<Replicas> for Value {
  fn from(replicas: Replicas) -> Self {
    match replicas {
      Replicas::Count(n) => Value::from(n),
      Replicas::PerTag(tags) => Value::Object(
        tags
          .into_iter()
          .map(|(tag, n)| (tag, Value::from(n)))
          .collect(),
      ),
    }
  }
}

/// A computed index expression. Provisioning never looks inside it; the
/// driver compiles it when the index is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexFunction(pub Value);

impl IndexFunction {
  pub fn term(&self) -> &Value {
    &self.0
  }
}

/// The `multi`/`geo` flags exactly as declared. Only the keys that were
/// present are carried.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexOptions {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub multi: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub geo: Option<Value>,
}

fn is_true(flag: &Option<Value>) -> bool {
  *flag == Some(Value::Bool(true))
}

/// Loose truthiness: anything but absent, null, false, zero or "".
fn is_set(flag: &Option<Value>) -> bool {
  match flag {
    None | Some(Value::Null) | Some(Value::Bool(false)) => false,
    Some(Value::Number(n)) => n.as_f64().map(|x| x != 0.0).unwrap_or(true),
    Some(Value::String(x)) => !x.is_empty(),
    Some(_) => true,
  }
}

/// What a driver receives for `create_index`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
  pub name: String,
  pub function: Option<IndexFunction>,
  /// Only present when at least one flag is set.
  pub options: Option<IndexOptions>,
}

impl IndexDefinition {
  pub fn multi(&self) -> bool {
    self.options.as_ref().map(|x| is_true(&x.multi)).unwrap_or(false)
  }

  pub fn geo(&self) -> bool {
    self.options.as_ref().map(|x| is_true(&x.geo)).unwrap_or(false)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexSpec {
  pub name: String,
  pub function: Option<IndexFunction>,
  pub multi: Option<Value>,
  pub geo: Option<Value>,
}

impl IndexSpec {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      function: None,
      multi: None,
      geo: None,
    }
  }

  pub fn function(mut self, term: Value) -> Self {
    self.function = Some(IndexFunction(term));
    self
  }

  pub fn multi(mut self) -> Self {
    self.multi = Some(Value::Bool(true));
    self
  }

  pub fn geo(mut self) -> Self {
    self.geo = Some(Value::Bool(true));
    self
  }

  pub fn definition(&self) -> IndexDefinition {
    let options = if is_set(&self.multi) || is_set(&self.geo) {
      Some(IndexOptions {
        multi: self.multi.clone(),
        geo: self.geo.clone(),
      })
    } else {
      None
    };
    IndexDefinition {
      name: self.name.clone(),
      function: self.function.clone(),
      options,
    }
  }
}

impl From<&str> for IndexSpec {
  fn from(name: &str) -> Self {
    Self::new(name)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableSpec {
  pub name: String,
  pub options: TableOptions,
  /// `None` means the entry declared no `indexes` at all, which also skips
  /// the index-build wait.
  pub indexes: Option<Vec<IndexSpec>>,
}

impl TableSpec {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      options: TableOptions::default(),
      indexes: None,
    }
  }

  pub fn primary_key(mut self, field: impl Into<String>) -> Self {
    self.options.primary_key = Some(Value::String(field.into()));
    self
  }

  pub fn durability(mut self, durability: impl Into<String>) -> Self {
    self.options.durability = Some(Value::String(durability.into()));
    self
  }

  pub fn shards(mut self, shards: u64) -> Self {
    self.options.shards = Some(Value::from(shards));
    self
  }

  pub fn replicas(mut self, replicas: Replicas) -> Self {
    self.options.replicas = Some(replicas.into());
    self
  }

  pub fn primary_replica_tag(mut self, tag: impl Into<String>) -> Self {
    self.options.primary_replica_tag = Some(Value::String(tag.into()));
    self
  }

  pub fn index(mut self, index: impl Into<IndexSpec>) -> Self {
    self
      .indexes
      .get_or_insert_with(Vec::new)
      .push(index.into());
    self
  }
}

impl From<&str> for TableSpec {
  fn from(name: &str) -> Self {
    Self::new(name)
  }
}

/// The tables to provision, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaDeclaration {
  tables: Vec<TableSpec>,
}

impl SchemaDeclaration {
  pub fn new(tables: Vec<TableSpec>) -> Self {
    Self { tables }
  }

  pub fn tables(&self) -> &[TableSpec] {
    &self.tables
  }

  pub fn is_empty(&self) -> bool {
    self.tables.is_empty()
  }
}

impl<T: Into<TableSpec>> FromIterator<T> for SchemaDeclaration {
  fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
    Self::new(iter.into_iter().map(Into::into).collect())
  }
}

impl TryFrom<&Value> for SchemaDeclaration {
  type Error = ConfigError;

  fn try_from(value: &Value) -> Result<Self, Self::Error> {
    parse_schema(value)
  }
}
