//! Idempotent bootstrapping of a database, its tables and their secondary
//! indexes from a declarative schema.

pub mod descriptor;
pub mod driver;
pub mod error;
pub mod provision;
pub mod schema;
pub mod validate;

pub use descriptor::ConnectionDescriptor;
pub use error::{ConnectionError, DriverError, ErrorKind, InitError};
pub use provision::Provisioner;
pub use schema::{IndexSpec, SchemaDeclaration, TableSpec};
pub use validate::ConfigError;

#[cfg(test)]
mod test_util;


#[cfg(test)]
mod validate_test;
