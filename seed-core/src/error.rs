use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validate::ConfigError;

/// Error classes a driver reports. The names follow the wire-level error
/// names so that callers matching on them keep working.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
  /// An operation could not be applied to the cluster state.
  OpFailed,
  /// Pre-2.1 name for runtime failures, including creation conflicts.
  LegacyRuntime,
  QueryLogic,
  Compile,
  Availability,
  Driver,
  Internal,
}

impl ErrorKind {
  pub fn name(&self) -> &'static str {
    match self {
      Self::OpFailed => "ReqlOpFailedError",
      Self::LegacyRuntime => "RqlRuntimeError",
      Self::QueryLogic => "ReqlQueryLogicError",
      Self::Compile => "ReqlCompileError",
      Self::Availability => "ReqlAvailabilityError",
      Self::Driver => "ReqlDriverError",
      Self::Internal => "ReqlInternalError",
    }
  }

  fn reports_conflicts(&self) -> bool {
    matches!(self, Self::OpFailed | Self::LegacyRuntime)
  }
}

impl Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name())
  }
}

const ALREADY_EXISTS: &str = "already exists";

/// A failed request, as reported by the driver.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
#[error("{kind}: {message}")]
pub struct DriverError {
  pub kind: ErrorKind,
  pub message: String,
}

impl DriverError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  /// Whether this error only says that the object being created is already
  /// there.
  pub fn is_already_exists(&self) -> bool {
    self.kind.reports_conflicts() && self.message.contains(ALREADY_EXISTS)
  }
}

/// The session to the database could not be established.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
#[error("could not connect to {address}: {reason}")]
pub struct ConnectionError {
  pub address: String,
  pub reason: String,
}

impl ConnectionError {
  pub fn new(address: impl Into<String>, reason: impl Into<String>) -> Self {
    Self {
      address: address.into(),
      reason: reason.into(),
    }
  }
}

/// Everything `initialize` can fail with. Each variant displays the inner
/// error untouched.
#[derive(Error, Debug)]
pub enum InitError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Connection(#[from] ConnectionError),

  #[error(transparent)]
  Driver(#[from] DriverError),
}

impl InitError {
  pub fn as_driver_error(&self) -> Option<&DriverError> {
    match self {
      Self::Driver(x) => Some(x),
      _ => None,
    }
  }

  pub fn as_config_error(&self) -> Option<&ConfigError> {
    match self {
      Self::Config(x) => Some(x),
      _ => None,
    }
  }
}
