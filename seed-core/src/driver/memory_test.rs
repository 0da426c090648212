use std::time::Duration;

use serde_json::json;

use super::{
  memory::{MemoryDriver, MemoryDriverOptions, Request},
  Connection, Driver, TableConfig,
};
use crate::{
  descriptor::ConnectionDescriptor,
  error::{DriverError, ErrorKind},
  schema::{IndexSpec, Replicas, TableOptions, TableSpec},
};

fn slow_driver() -> MemoryDriver {
  MemoryDriver::with_options(MemoryDriverOptions {
    build_delay: Duration::from_millis(200),
    ..Default::default()
  })
}

async fn connect(driver: &MemoryDriver) -> Box<dyn Connection> {
  driver
    .connect(&ConnectionDescriptor::new("app"))
    .await
    .unwrap()
}

#[tokio::test]
async fn conflicts_say_already_exists() {
  let _ = pretty_env_logger::try_init();
  let driver = MemoryDriver::new();
  let conn = connect(&driver).await;

  conn.create_database("app").await.unwrap();
  let err = conn.create_database("app").await.unwrap_err();
  assert_eq!(
    err,
    DriverError::new(ErrorKind::OpFailed, "Database `app` already exists.")
  );

  conn
    .create_table("app", "users", &TableOptions::default())
    .await
    .unwrap();
  let err = conn
    .create_table("app", "users", &TableOptions::default())
    .await
    .unwrap_err();
  assert_eq!(err.message, "Table `app.users` already exists.");
  assert!(err.is_already_exists());

  let email = IndexSpec::new("email").definition();
  conn.create_index("app", "users", &email).await.unwrap();
  let err = conn.create_index("app", "users", &email).await.unwrap_err();
  assert_eq!(err.message, "Index `email` already exists on table `app.users`.");
  assert!(err.is_already_exists());
}

#[tokio::test]
async fn legacy_conflict_kind() {
  let driver = MemoryDriver::with_options(MemoryDriverOptions {
    legacy_errors: true,
    ..Default::default()
  });
  let conn = connect(&driver).await;
  conn.create_database("app").await.unwrap();
  let err = conn.create_database("app").await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::LegacyRuntime);
  assert_eq!(err.to_string(), "RqlRuntimeError: Database `app` already exists.");
}

#[tokio::test]
async fn missing_parents() {
  let driver = MemoryDriver::new();
  let conn = connect(&driver).await;

  let err = conn
    .create_table("nope", "t", &TableOptions::default())
    .await
    .unwrap_err();
  assert_eq!(err.message, "Database `nope` does not exist.");
  assert!(!err.is_already_exists());

  conn.create_database("app").await.unwrap();
  let err = conn
    .create_index("app", "t", &IndexSpec::new("i").definition())
    .await
    .unwrap_err();
  assert_eq!(err.message, "Table `app.t` does not exist.");

  let err = conn.wait_for_indexes("app", "t").await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::OpFailed);
}

#[tokio::test]
async fn names_are_checked() {
  let driver = MemoryDriver::new();
  let conn = connect(&driver).await;
  for bad in &["", "1st", "has-dash", "has space"] {
    let err = conn.create_database(bad).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueryLogic, "{}", bad);
  }
  conn.create_database("_ok_123").await.unwrap();
}

#[tokio::test]
async fn table_options_are_applied() {
  let driver = MemoryDriver::new();
  let conn = connect(&driver).await;
  conn.create_database("app").await.unwrap();

  let events = TableSpec::new("events")
    .primary_key("event_id")
    .durability("soft")
    .shards(4)
    .replicas(Replicas::PerTag(
      vec![("us".to_string(), 2)].into_iter().collect(),
    ))
    .primary_replica_tag("us");
  conn
    .create_table("app", "events", &events.options)
    .await
    .unwrap();
  assert_eq!(
    conn.table_config("app", "events").await.unwrap(),
    TableConfig {
      name: "events".into(),
      primary_key: "event_id".into(),
      durability: "soft".into(),
      shards: 4,
      replicas: Replicas::PerTag(vec![("us".to_string(), 2)].into_iter().collect()),
      primary_replica_tag: Some("us".into()),
    }
  );

  let err = conn
    .create_table("app", "bad", &TableSpec::new("bad").durability("medium").options)
    .await
    .unwrap_err();
  assert_eq!(err.kind, ErrorKind::QueryLogic);
  assert!(conn.list_tables("app").await.unwrap() == vec!["events"]);
}

#[tokio::test]
async fn reading_a_building_index_fails() {
  let _ = pretty_env_logger::try_init();
  let driver = slow_driver();
  let conn = connect(&driver).await;
  conn.create_database("app").await.unwrap();
  conn
    .create_table("app", "t", &TableOptions::default())
    .await
    .unwrap();
  conn
    .create_index("app", "t", &IndexSpec::new("v").definition())
    .await
    .unwrap();

  assert!(!conn.index_status("app", "t").await.unwrap()[0].ready);
  let err = driver
    .get_all("app", "t", &json!(1), "v")
    .await
    .unwrap_err();
  assert!(err.message.contains("before its construction was finished"));

  conn.wait_for_indexes("app", "t").await.unwrap();
  assert!(conn.index_status("app", "t").await.unwrap()[0].ready);
  assert!(driver
    .get_all("app", "t", &json!(1), "v")
    .await
    .unwrap()
    .is_empty());
}

#[tokio::test]
async fn bad_index_functions_do_not_create_anything() {
  let driver = MemoryDriver::new();
  let conn = connect(&driver).await;
  conn.create_database("app").await.unwrap();
  conn
    .create_table("app", "t", &TableOptions::default())
    .await
    .unwrap();

  for term in &[json!(3), json!({}), json!({"field": 1}), json!({"add": []})] {
    let err = conn
      .create_index("app", "t", &IndexSpec::new("f").function(term.clone()).definition())
      .await
      .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Compile, "{}", term);
  }
  assert!(conn.list_indexes("app", "t").await.unwrap().is_empty());
}

#[tokio::test]
async fn rows_and_primary_keys() {
  let driver = MemoryDriver::new();
  let conn = connect(&driver).await;
  conn.create_database("app").await.unwrap();
  conn
    .create_table("app", "t", &TableSpec::new("t").primary_key("slug").options)
    .await
    .unwrap();

  let n = driver
    .insert("app", "t", vec![json!({"slug": "a"}), json!({"title": "untitled"})])
    .await
    .unwrap();
  assert_eq!(n, 2);
  assert_eq!(
    driver.get_all("app", "t", &json!("a"), "slug").await.unwrap(),
    vec![json!({"slug": "a"})]
  );

  let err = driver
    .insert("app", "t", vec![json!({"slug": "a"})])
    .await
    .unwrap_err();
  assert_eq!(err.message, "Duplicate primary key `slug`.");
  let err = driver
    .insert("app", "t", vec![json!("not a row")])
    .await
    .unwrap_err();
  assert_eq!(err.kind, ErrorKind::QueryLogic);
}

#[tokio::test]
async fn faults_fire_once() {
  let driver = MemoryDriver::new();
  let conn = connect(&driver).await;
  let fault = DriverError::new(ErrorKind::Internal, "boom");
  driver
    .inject_fault(
      Request::CreateDatabase {
        database: "app".into(),
      },
      fault.clone(),
    )
    .await;

  assert_eq!(conn.create_database("app").await.unwrap_err(), fault);
  conn.create_database("app").await.unwrap();
  assert_eq!(driver.journal().await.len(), 2);
  driver.clear_journal().await;
  assert!(driver.journal().await.is_empty());
}

#[tokio::test]
async fn closed_connections_refuse_requests() {
  let driver = MemoryDriver::new();
  let conn = driver
    .connect(&ConnectionDescriptor::new("app"))
    .await
    .unwrap();
  assert!(conn.is_open());

  let direct = driver.open_session();
  direct.close();
  assert!(!direct.is_open());
  let err = direct.create_database("app").await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::Driver);

  // Other sessions are unaffected.
  conn.create_database("app").await.unwrap();
  assert!(driver.drop_database("app").await);
  assert!(conn.list_databases().await.unwrap().is_empty());
}

#[tokio::test]
async fn wrongly_typed_options_are_rejected_by_the_server() {
  let driver = MemoryDriver::new();
  let conn = connect(&driver).await;
  conn.create_database("app").await.unwrap();

  let options = TableOptions {
    durability: Some(json!(5)),
    ..Default::default()
  };
  let err = conn.create_table("app", "t", &options).await.unwrap_err();
  assert_eq!(
    err,
    DriverError::new(
      ErrorKind::QueryLogic,
      "Expected a STRING for option `durability` but found NUMBER."
    )
  );

  let options = TableOptions {
    replicas: Some(json!("three")),
    ..Default::default()
  };
  let err = conn.create_table("app", "t", &options).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::QueryLogic);
  assert!(conn.list_tables("app").await.unwrap().is_empty());

  conn
    .create_table("app", "t", &TableOptions::default())
    .await
    .unwrap();
  let mut geo = IndexSpec::new("location");
  geo.geo = Some(json!("yes"));
  let err = conn
    .create_index("app", "t", &geo.definition())
    .await
    .unwrap_err();
  assert_eq!(
    err.message,
    "Expected a BOOL for option `geo` but found STRING."
  );
  assert!(conn.list_indexes("app", "t").await.unwrap().is_empty());
}
