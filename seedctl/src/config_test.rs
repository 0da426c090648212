use seed_core::validate::{parse_connection, parse_schema};
use serde_json::json;

use crate::config::{ConfigFileError, SeedConfig};

#[test]
fn sample_config_is_valid() {
  let config = SeedConfig::parse(include_str!("../sample.yaml")).unwrap();
  let descriptor = parse_connection(&config.connection).unwrap();
  assert_eq!(descriptor.database(), "shop");
  assert_eq!(descriptor.address(), "localhost:28015");

  let schema = parse_schema(&config.schema).unwrap();
  let names = schema
    .tables()
    .iter()
    .map(|x| x.name.as_str())
    .collect::<Vec<_>>();
  assert_eq!(names, vec!["audit_log", "customers", "stores", "orders"]);

  let stores = &schema.tables()[2];
  assert_eq!(stores.options.primary_key, Some(json!("slug")));
  assert_eq!(stores.options.replicas, Some(json!(1)));
  assert!(stores.indexes.as_ref().unwrap()[0].definition().geo());
  assert!(schema.tables()[3].indexes.as_ref().unwrap()[0]
    .function
    .is_some());
}

#[test]
fn config_needs_both_halves() {
  let err = SeedConfig::parse("connection:\n  database: x\n").unwrap_err();
  assert_eq!(
    err.downcast_ref::<ConfigFileError>(),
    Some(&ConfigFileError::MissingKey("schema"))
  );

  let err = SeedConfig::parse("- a\n- b\n").unwrap_err();
  assert_eq!(
    err.downcast_ref::<ConfigFileError>(),
    Some(&ConfigFileError::NotAMapping)
  );
}
