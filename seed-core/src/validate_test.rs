use serde_json::json;

use crate::{
  descriptor::ConnectionDescriptor,
  schema::{IndexOptions, SchemaDeclaration, TableSpec},
  validate::{parse_connection, parse_schema, validate, ConfigError},
};

#[test]
fn connection_must_be_an_object() {
  for bad in &[json!(null), json!("not-an-object"), json!(3), json!([{"database": "x"}])] {
    let err = parse_connection(bad).unwrap_err();
    assert!(matches!(err, ConfigError::ConnectionNotObject(_)));
    assert!(err.to_string().contains("object"));
  }
}

#[test]
fn connection_requires_database() {
  for bad in &[
    json!({"host": "localhost"}),
    json!({"database": ""}),
    json!({"database": 42}),
    json!({"database": null}),
    json!({"db": ""}),
  ] {
    assert_eq!(parse_connection(bad).unwrap_err(), ConfigError::MissingDatabase);
  }
}

#[test]
fn connection_keeps_driver_params() {
  let d = parse_connection(&json!({
    "database": "app",
    "host": "db.internal",
    "port": 29015,
    "password": "hunter2",
    "timeout": 20
  }))
  .unwrap();
  assert_eq!(d.database(), "app");
  assert_eq!(d.address(), "db.internal:29015");
  assert_eq!(d.password(), Some("hunter2"));
  assert_eq!(d.param("timeout"), Some(&json!(20)));
  assert!(d.param("database").is_none());
}

#[test]
fn connection_accepts_db_alias() {
  let d = parse_connection(&json!({"db": "legacy"})).unwrap();
  assert_eq!(d.database(), "legacy");
  assert_eq!(d.address(), "localhost:28015");
  assert!(d.param("db").is_none());

  let d = parse_connection(&json!({"database": null, "db": "legacy"})).unwrap();
  assert_eq!(d.database(), "legacy");
}

#[test]
fn schema_must_be_an_array() {
  let err = parse_schema(&json!("table1")).unwrap_err();
  assert_eq!(err, ConfigError::SchemaNotArray("string"));
  assert!(err.to_string().contains("array"));

  let err = parse_schema(&json!({"name": "table_2", "indexes": "not-an-array"})).unwrap_err();
  assert_eq!(err, ConfigError::SchemaNotArray("object"));
}

#[test]
fn table_entries_must_be_strings_or_objects() {
  let err = parse_schema(&json!([null, 1, 3])).unwrap_err();
  assert_eq!(err, ConfigError::InvalidTableEntry { index: 0, got: "null" });
  assert!(err.to_string().contains("string"));

  let err = parse_schema(&json!(["ok", 3])).unwrap_err();
  assert_eq!(err, ConfigError::InvalidTableEntry { index: 1, got: "number" });
  assert!(err.to_string().contains("object"));

  let err = parse_schema(&json!([["nested"]])).unwrap_err();
  assert_eq!(err, ConfigError::InvalidTableEntry { index: 0, got: "array" });
}

#[test]
fn table_entries_need_a_name() {
  for bad in &[
    json!([{"primaryKey": "id"}]),
    json!([{"name": ""}]),
    json!([{"name": 7}]),
    json!([""]),
  ] {
    assert_eq!(
      parse_schema(bad).unwrap_err(),
      ConfigError::MissingTableName { index: 0 }
    );
  }
}

#[test]
fn indexes_must_be_an_array() {
  let err = parse_schema(&json!([{"name": "table_2", "indexes": "not-an-array"}])).unwrap_err();
  assert_eq!(
    err,
    ConfigError::IndexesNotArray {
      table: "table_2".into(),
      got: "string"
    }
  );
  assert!(err.to_string().contains("array"));

  // Present but null is not the same as leaving `indexes` out.
  let err = parse_schema(&json!([{"name": "t", "indexes": null}])).unwrap_err();
  assert_eq!(
    err,
    ConfigError::IndexesNotArray {
      table: "t".into(),
      got: "null"
    }
  );
}

#[test]
fn index_entries_are_checked() {
  let err = parse_schema(&json!([{"name": "t", "indexes": ["a", false]}])).unwrap_err();
  assert_eq!(
    err,
    ConfigError::InvalidIndexEntry {
      table: "t".into(),
      index: 1,
      got: "boolean"
    }
  );

  let err = parse_schema(&json!([{"name": "t", "indexes": [{"multi": true}]}])).unwrap_err();
  assert_eq!(
    err,
    ConfigError::MissingIndexName {
      table: "t".into(),
      index: 0
    }
  );

  // Flag values are the driver's business.
  let schema = parse_schema(&json!([{"name": "t", "indexes": [{"name": "i", "geo": "yes"}]}]))
    .unwrap();
  let def = schema.tables()[0].indexes.as_ref().unwrap()[0].definition();
  assert_eq!(
    def.options,
    Some(IndexOptions {
      multi: None,
      geo: Some(json!("yes"))
    })
  );
  assert!(!def.geo());
}

#[test]
fn table_options_are_picked_not_checked() {
  let schema = parse_schema(&json!([
    "table_1",
    {
      "name": "table_2",
      "primaryKey": "location",
      "durability": "soft",
      "shards": 2,
      "replicas": {"us": 2, "eu": 1},
      "primaryReplicaTag": "us",
      "colour": "blue"
    }
  ]))
  .unwrap();

  let tables = schema.tables();
  assert_eq!(tables[0], TableSpec::new("table_1"));
  assert!(tables[0].options.is_empty());
  assert!(tables[0].indexes.is_none());

  let opts = &tables[1].options;
  assert_eq!(opts.primary_key, Some(json!("location")));
  assert_eq!(opts.durability, Some(json!("soft")));
  assert_eq!(opts.shards, Some(json!(2)));
  assert_eq!(opts.replicas, Some(json!({"us": 2, "eu": 1})));
  assert_eq!(opts.primary_replica_tag, Some(json!("us")));

  // Wrongly typed values go through as declared.
  let schema = parse_schema(&json!([{"name": "t", "durability": 5, "shards": "two"}])).unwrap();
  let opts = &schema.tables()[0].options;
  assert_eq!(opts.durability, Some(json!(5)));
  assert_eq!(opts.shards, Some(json!("two")));
}

#[test]
fn index_options_only_when_flagged() {
  let schema = parse_schema(&json!([{
    "name": "t",
    "indexes": [
      "plain",
      {"name": "computed", "indexFunction": {"add": [{"field": "a"}, {"field": "b"}]}},
      {"name": "tags", "multi": true},
      {"name": "location", "geo": true, "multi": false}
    ]
  }]))
  .unwrap();
  let defs = schema.tables()[0]
    .indexes
    .as_ref()
    .unwrap()
    .iter()
    .map(|x| x.definition())
    .collect::<Vec<_>>();

  assert_eq!(defs[0].name, "plain");
  assert!(defs[0].function.is_none());
  assert!(defs[0].options.is_none());

  assert!(defs[1].function.is_some());
  assert!(defs[1].options.is_none());

  assert_eq!(
    defs[2].options,
    Some(IndexOptions {
      multi: Some(json!(true)),
      geo: None
    })
  );
  assert!(defs[2].multi());
  assert_eq!(
    defs[3].options,
    Some(IndexOptions {
      multi: Some(json!(false)),
      geo: Some(json!(true))
    })
  );
  assert!(defs[3].geo() && !defs[3].multi());
}

#[test]
fn typed_input_checks_names() {
  let schema: SchemaDeclaration = vec!["a", "b"].into_iter().collect();
  assert!(validate(&ConnectionDescriptor::new("app"), &schema).is_ok());
  assert_eq!(
    validate(&ConnectionDescriptor::new(""), &schema).unwrap_err(),
    ConfigError::MissingDatabase
  );

  let schema = SchemaDeclaration::new(vec![TableSpec::new("a"), TableSpec::new("")]);
  assert_eq!(
    validate(&ConnectionDescriptor::new("app"), &schema).unwrap_err(),
    ConfigError::MissingTableName { index: 1 }
  );

  let schema = SchemaDeclaration::new(vec![TableSpec::new("a").index("ok").index("")]);
  assert_eq!(
    validate(&ConnectionDescriptor::new("app"), &schema).unwrap_err(),
    ConfigError::MissingIndexName {
      table: "a".into(),
      index: 1
    }
  );
}
