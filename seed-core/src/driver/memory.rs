use std::{
  cmp::Ordering as CmpOrdering,
  collections::BTreeMap,
  sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
  },
  time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use super::{
  check_index_options, check_name,
  term::{self, Term},
  Connection, Driver, IndexStatus, TableConfig,
};
use crate::{
  descriptor::ConnectionDescriptor,
  error::{ConnectionError, DriverError, ErrorKind},
  schema::{IndexDefinition, TableOptions},
};

#[derive(Clone, Debug)]
pub struct MemoryDriverOptions {
  /// How long each index takes to build after it is created.
  pub build_delay: Duration,
  /// Report conflicts under the pre-2.1 error name.
  pub legacy_errors: bool,
  /// When set, connections must present this password.
  pub password: Option<String>,
}

impl Default for MemoryDriverOptions {
  fn default() -> Self {
    Self {
      build_delay: Duration::from_millis(20),
      legacy_errors: false,
      password: None,
    }
  }
}

/// A request as seen by the in-memory server, recorded in arrival order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
  CreateDatabase {
    database: String,
  },
  CreateTable {
    database: String,
    table: String,
  },
  CreateIndex {
    database: String,
    table: String,
    index: String,
  },
  WaitForIndexes {
    database: String,
    table: String,
  },
}

/// An in-process database server. Clones share the same state.
///
/// Index builds run as `tokio::spawn`ed tasks, so `create_index` must be
/// polled inside a Tokio runtime.
#[derive(Clone)]
pub struct MemoryDriver {
  state: Arc<MemoryState>,
}

struct MemoryState {
  options: MemoryDriverOptions,
  catalog: Mutex<Catalog>,
  journal: Mutex<Vec<Request>>,
  faults: Mutex<Vec<(Request, DriverError)>>,
  reachable: AtomicBool,
  connect_count: AtomicU64,
}

#[derive(Default)]
struct Catalog {
  databases: BTreeMap<String, Database>,
}

#[derive(Default)]
struct Database {
  tables: BTreeMap<String, Table>,
}

struct Table {
  config: TableConfig,
  indexes: BTreeMap<String, Index>,
  rows: BTreeMap<String, Value>,
  next_generated_key: u64,
}

struct Index {
  definition: IndexDefinition,
  term: Option<Term>,
  built: watch::Receiver<bool>,
}

impl Index {
  fn is_ready(&self) -> bool {
    *self.built.borrow()
  }

  fn keys(&self, row: &Value) -> Vec<Value> {
    let value = match &self.term {
      Some(term) => term.eval(row),
      None => row.get(&self.definition.name).cloned(),
    };
    match value {
      None | Some(Value::Null) => vec![],
      Some(Value::Array(elements)) if self.definition.multi() => elements,
      Some(x) => vec![x],
    }
  }
}

pub struct MemoryConnection {
  id: u64,
  state: Arc<MemoryState>,
  open: AtomicBool,
}

fn not_found(message: String) -> DriverError {
  DriverError::new(ErrorKind::OpFailed, message)
}

impl Catalog {
  fn database(&self, database: &str) -> Result<&Database, DriverError> {
    self
      .databases
      .get(database)
      .ok_or_else(|| not_found(format!("Database `{}` does not exist.", database)))
  }

  fn database_mut(&mut self, database: &str) -> Result<&mut Database, DriverError> {
    self
      .databases
      .get_mut(database)
      .ok_or_else(|| not_found(format!("Database `{}` does not exist.", database)))
  }

  fn table(&self, database: &str, table: &str) -> Result<&Table, DriverError> {
    self
      .database(database)?
      .tables
      .get(table)
      .ok_or_else(|| not_found(format!("Table `{}.{}` does not exist.", database, table)))
  }

  fn table_mut(&mut self, database: &str, table: &str) -> Result<&mut Table, DriverError> {
    self
      .database_mut(database)?
      .tables
      .get_mut(table)
      .ok_or_else(|| not_found(format!("Table `{}.{}` does not exist.", database, table)))
  }
}

impl Table {
  fn ready_index(&self, database: &str, index: &str) -> Result<&Index, DriverError> {
    let ix = self.indexes.get(index).ok_or_else(|| {
      not_found(format!(
        "Index `{}` was not found on table `{}.{}`.",
        index, database, self.config.name
      ))
    })?;
    if !ix.is_ready() {
      return Err(DriverError::new(
        ErrorKind::OpFailed,
        format!(
          "Index `{}` on table `{}.{}` was accessed before its construction was finished.",
          index, database, self.config.name
        ),
      ));
    }
    Ok(ix)
  }
}

impl MemoryDriver {
  pub fn new() -> Self {
    Self::with_options(MemoryDriverOptions::default())
  }

  pub fn with_options(options: MemoryDriverOptions) -> Self {
    MemoryDriver {
      state: Arc::new(MemoryState {
        options,
        catalog: Mutex::new(Catalog::default()),
        journal: Mutex::new(vec![]),
        faults: Mutex::new(vec![]),
        reachable: AtomicBool::new(true),
        connect_count: AtomicU64::new(0),
      }),
    }
  }

  /// Opens a session directly, bypassing reachability and password checks.
  pub fn open_session(&self) -> MemoryConnection {
    let id = self.state.connect_count.fetch_add(1, Ordering::SeqCst) + 1;
    self.session_with_id(id)
  }

  fn session_with_id(&self, id: u64) -> MemoryConnection {
    MemoryConnection {
      id,
      state: self.state.clone(),
      open: AtomicBool::new(true),
    }
  }

  pub fn connect_count(&self) -> u64 {
    self.state.connect_count.load(Ordering::SeqCst)
  }

  pub fn set_reachable(&self, reachable: bool) {
    self.state.reachable.store(reachable, Ordering::SeqCst);
  }

  pub async fn journal(&self) -> Vec<Request> {
    self.state.journal.lock().await.clone()
  }

  pub async fn clear_journal(&self) {
    self.state.journal.lock().await.clear();
  }

  /// Makes the next matching request fail with `error` instead of running.
  pub async fn inject_fault(&self, request: Request, error: DriverError) {
    self.state.faults.lock().await.push((request, error));
  }

  pub async fn drop_database(&self, name: &str) -> bool {
    self
      .state
      .catalog
      .lock()
      .await
      .databases
      .remove(name)
      .is_some()
  }

  /// Inserts rows, generating a primary key for rows that lack one.
  /// Returns the number of rows inserted.
  pub async fn insert(
    &self,
    database: &str,
    table: &str,
    rows: Vec<Value>,
  ) -> Result<usize, DriverError> {
    let mut catalog = self.state.catalog.lock().await;
    let t = catalog.table_mut(database, table)?;
    let primary_key = t.config.primary_key.clone();

    let mut inserted = 0;
    for mut row in rows {
      let obj = row.as_object_mut().ok_or_else(|| {
        DriverError::new(ErrorKind::QueryLogic, "Expected type OBJECT in insert.")
      })?;
      let key = match obj.get(&primary_key) {
        Some(x) => x.clone(),
        None => {
          t.next_generated_key += 1;
          let generated = Value::String(format!("{:016x}", t.next_generated_key));
          obj.insert(primary_key.clone(), generated.clone());
          generated
        }
      };
      let key = key.to_string();
      if t.rows.contains_key(&key) {
        return Err(DriverError::new(
          ErrorKind::OpFailed,
          format!("Duplicate primary key `{}`.", primary_key),
        ));
      }
      t.rows.insert(key, row);
      inserted += 1;
    }
    Ok(inserted)
  }

  /// Rows whose `index` value (or any element of it, for multi indexes)
  /// equals `key`, in primary key order.
  pub async fn get_all(
    &self,
    database: &str,
    table: &str,
    key: &Value,
    index: &str,
  ) -> Result<Vec<Value>, DriverError> {
    let catalog = self.state.catalog.lock().await;
    let t = catalog.table(database, table)?;

    if index == t.config.primary_key {
      return Ok(t.rows.get(&key.to_string()).cloned().into_iter().collect());
    }

    let ix = t.ready_index(database, index)?;
    Ok(
      t.rows
        .values()
        .filter(|row| ix.keys(row).iter().any(|x| x == key))
        .cloned()
        .collect(),
    )
  }

  /// Rows ordered by their `index` value. Rows without a value are skipped.
  pub async fn order_by_index(
    &self,
    database: &str,
    table: &str,
    index: &str,
    descending: bool,
  ) -> Result<Vec<Value>, DriverError> {
    let catalog = self.state.catalog.lock().await;
    let t = catalog.table(database, table)?;
    let ix = t.ready_index(database, index)?;
    if ix.definition.multi() {
      return Err(DriverError::new(
        ErrorKind::QueryLogic,
        format!("Cannot order by multi index `{}`.", index),
      ));
    }

    let mut keyed = t
      .rows
      .values()
      .filter_map(|row| ix.keys(row).into_iter().next().map(|k| (k, row.clone())))
      .collect::<Vec<_>>();
    keyed.sort_by(|a, b| compare_values(&a.0, &b.0));
    if descending {
      keyed.reverse();
    }
    Ok(keyed.into_iter().map(|x| x.1).collect())
  }
}

impl Default for MemoryDriver {
  fn default() -> Self {
    Self::new()
  }
}

fn type_rank(v: &Value) -> u8 {
  match v {
    Value::Null => 0,
    Value::Bool(_) => 1,
    Value::Number(_) => 2,
    Value::String(_) => 3,
    Value::Array(_) => 4,
    Value::Object(_) => 5,
  }
}

fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
  match (a, b) {
    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
    (Value::Number(x), Value::Number(y)) => x
      .as_f64()
      .partial_cmp(&y.as_f64())
      .unwrap_or(CmpOrdering::Equal),
    (Value::String(x), Value::String(y)) => x.cmp(y),
    (Value::Array(x), Value::Array(y)) => x
      .iter()
      .zip(y.iter())
      .map(|(x, y)| compare_values(x, y))
      .find(|x| *x != CmpOrdering::Equal)
      .unwrap_or_else(|| x.len().cmp(&y.len())),
    _ => type_rank(a).cmp(&type_rank(b)),
  }
}

#[async_trait]
impl Driver for MemoryDriver {
  async fn connect(
    &self,
    descriptor: &ConnectionDescriptor,
  ) -> Result<Box<dyn Connection>, ConnectionError> {
    let id = self.state.connect_count.fetch_add(1, Ordering::SeqCst) + 1;
    if !self.state.reachable.load(Ordering::SeqCst) {
      return Err(ConnectionError::new(
        descriptor.address(),
        "connection refused",
      ));
    }
    if let Some(password) = &self.state.options.password {
      if descriptor.password() != Some(password.as_str()) {
        return Err(ConnectionError::new(
          descriptor.address(),
          "wrong password",
        ));
      }
    }
    log::trace!("[conn {}] opened to {}", id, descriptor.address());
    Ok(Box::new(self.session_with_id(id)))
  }
}

impl MemoryConnection {
  pub fn close(&self) {
    log::trace!("[conn {}] closed", self.id);
    self.open.store(false, Ordering::SeqCst);
  }

  fn ensure_open(&self) -> Result<(), DriverError> {
    if self.open.load(Ordering::SeqCst) {
      Ok(())
    } else {
      Err(DriverError::new(ErrorKind::Driver, "Connection is closed."))
    }
  }

  async fn begin(&self, request: Request) -> Result<(), DriverError> {
    self.ensure_open()?;
    log::trace!("[conn {}] {:?}", self.id, request);
    self.state.journal.lock().await.push(request.clone());

    let mut faults = self.state.faults.lock().await;
    if let Some(pos) = faults.iter().position(|x| x.0 == request) {
      return Err(faults.remove(pos).1);
    }
    Ok(())
  }

  fn conflict(&self, message: String) -> DriverError {
    let kind = if self.state.options.legacy_errors {
      ErrorKind::LegacyRuntime
    } else {
      ErrorKind::OpFailed
    };
    DriverError::new(kind, message)
  }
}

#[async_trait]
impl Connection for MemoryConnection {
  async fn create_database(&self, name: &str) -> Result<(), DriverError> {
    self
      .begin(Request::CreateDatabase {
        database: name.to_string(),
      })
      .await?;
    check_name("Database", name)?;

    let mut catalog = self.state.catalog.lock().await;
    if catalog.databases.contains_key(name) {
      return Err(self.conflict(format!("Database `{}` already exists.", name)));
    }
    catalog
      .databases
      .insert(name.to_string(), Database::default());
    Ok(())
  }

  async fn create_table(
    &self,
    database: &str,
    name: &str,
    options: &TableOptions,
  ) -> Result<(), DriverError> {
    self
      .begin(Request::CreateTable {
        database: database.to_string(),
        table: name.to_string(),
      })
      .await?;
    check_name("Table", name)?;
    let config = TableConfig::from_options(name, options)?;

    let mut catalog = self.state.catalog.lock().await;
    let db = catalog.database_mut(database)?;
    if db.tables.contains_key(name) {
      return Err(self.conflict(format!("Table `{}.{}` already exists.", database, name)));
    }
    db.tables.insert(
      name.to_string(),
      Table {
        config,
        indexes: BTreeMap::new(),
        rows: BTreeMap::new(),
        next_generated_key: 0,
      },
    );
    Ok(())
  }

  async fn create_index(
    &self,
    database: &str,
    table: &str,
    index: &IndexDefinition,
  ) -> Result<(), DriverError> {
    self
      .begin(Request::CreateIndex {
        database: database.to_string(),
        table: table.to_string(),
        index: index.name.clone(),
      })
      .await?;
    check_name("Index", &index.name)?;
    check_index_options(index)?;
    let term = index.function.as_ref().map(term::compile).transpose()?;

    let mut catalog = self.state.catalog.lock().await;
    let t = catalog.table_mut(database, table)?;
    if t.indexes.contains_key(&index.name) {
      return Err(self.conflict(format!(
        "Index `{}` already exists on table `{}.{}`.",
        index.name, database, table
      )));
    }

    let (built_tx, built_rx) = watch::channel(false);
    let delay = self.state.options.build_delay;
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let _ = built_tx.send(true);
    });
    t.indexes.insert(
      index.name.clone(),
      Index {
        definition: index.clone(),
        term,
        built: built_rx,
      },
    );
    Ok(())
  }

  async fn wait_for_indexes(&self, database: &str, table: &str) -> Result<(), DriverError> {
    self
      .begin(Request::WaitForIndexes {
        database: database.to_string(),
        table: table.to_string(),
      })
      .await?;
    let pending = {
      let catalog = self.state.catalog.lock().await;
      catalog
        .table(database, table)?
        .indexes
        .iter()
        .map(|(name, ix)| (name.clone(), ix.built.clone()))
        .collect::<Vec<_>>()
    };

    for (name, mut built) in pending {
      loop {
        if *built.borrow_and_update() {
          break;
        }
        if built.changed().await.is_err() {
          return Err(DriverError::new(
            ErrorKind::Internal,
            format!(
              "Build of index `{}` on table `{}.{}` was abandoned.",
              name, database, table
            ),
          ));
        }
      }
    }
    Ok(())
  }

  async fn list_databases(&self) -> Result<Vec<String>, DriverError> {
    self.ensure_open()?;
    let catalog = self.state.catalog.lock().await;
    Ok(catalog.databases.keys().cloned().collect())
  }

  async fn list_tables(&self, database: &str) -> Result<Vec<String>, DriverError> {
    self.ensure_open()?;
    let catalog = self.state.catalog.lock().await;
    Ok(catalog.database(database)?.tables.keys().cloned().collect())
  }

  async fn list_indexes(&self, database: &str, table: &str) -> Result<Vec<String>, DriverError> {
    self.ensure_open()?;
    let catalog = self.state.catalog.lock().await;
    Ok(catalog.table(database, table)?.indexes.keys().cloned().collect())
  }

  async fn table_config(&self, database: &str, table: &str) -> Result<TableConfig, DriverError> {
    self.ensure_open()?;
    let catalog = self.state.catalog.lock().await;
    Ok(catalog.table(database, table)?.config.clone())
  }

  async fn index_status(
    &self,
    database: &str,
    table: &str,
  ) -> Result<Vec<IndexStatus>, DriverError> {
    self.ensure_open()?;
    let catalog = self.state.catalog.lock().await;
    Ok(
      catalog
        .table(database, table)?
        .indexes
        .iter()
        .map(|(name, ix)| IndexStatus {
          index: name.clone(),
          ready: ix.is_ready(),
          multi: ix.definition.multi(),
          geo: ix.definition.geo(),
          function: ix.definition.function.clone(),
        })
        .collect(),
    )
  }

  fn is_open(&self) -> bool {
    self.open.load(Ordering::SeqCst)
  }
}
