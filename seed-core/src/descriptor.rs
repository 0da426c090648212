use std::convert::TryFrom;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::validate::{parse_connection, ConfigError};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u64 = 28015;

/// Where to connect and which database to provision.
///
/// Everything except `database` is handed to the driver as-is.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionDescriptor {
  database: String,
  #[serde(flatten)]
  params: Map<String, Value>,
}

impl ConnectionDescriptor {
  pub fn new(database: impl Into<String>) -> Self {
    Self {
      database: database.into(),
      params: Map::new(),
    }
  }

  pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub(crate) fn from_parts(database: String, params: Map<String, Value>) -> Self {
    Self { database, params }
  }

  pub fn database(&self) -> &str {
    &self.database
  }

  pub fn params(&self) -> &Map<String, Value> {
    &self.params
  }

  pub fn param(&self, key: &str) -> Option<&Value> {
    self.params.get(key)
  }

  pub fn host(&self) -> &str {
    self
      .param("host")
      .and_then(|x| x.as_str())
      .unwrap_or(DEFAULT_HOST)
  }

  pub fn port(&self) -> u64 {
    self
      .param("port")
      .and_then(|x| x.as_u64())
      .unwrap_or(DEFAULT_PORT)
  }

  pub fn user(&self) -> Option<&str> {
    self.param("user").and_then(|x| x.as_str())
  }

  pub fn password(&self) -> Option<&str> {
    self.param("password").and_then(|x| x.as_str())
  }

  pub fn address(&self) -> String {
    format!("{}:{}", self.host(), self.port())
  }
}

impl TryFrom<&Value> for ConnectionDescriptor {
  type Error = ConfigError;

  fn try_from(value: &Value) -> Result<Self, Self::Error> {
    parse_connection(value)
  }
}
