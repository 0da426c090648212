use anyhow::Result;
use seed_core::{
  driver::{sqlite::SqliteDriver, Connection, Driver},
  validate::{parse_connection, parse_schema},
  ConnectionDescriptor, Provisioner,
};
use serde_json::json;
use structopt::StructOpt;
use thiserror::Error;

use crate::{
  config::SeedConfig,
  opt::{Command, Opt},
};

mod config;
mod opt;

#[cfg(test)]
mod config_test;

#[derive(Error, Debug)]
enum CliError {
  #[error("this command needs `--data`")]
  MissingDataFile,
}

#[tokio::main]
async fn main() -> Result<()> {
  if std::env::var("RUST_LOG").is_err() {
    std::env::set_var("RUST_LOG", "info");
  }
  pretty_env_logger::init_timed();
  let opt = Opt::from_args();

  match &opt.cmd {
    Command::Check { config } => {
      let config = SeedConfig::load(config)?;
      let descriptor = parse_connection(&config.connection)?;
      let schema = parse_schema(&config.schema)?;
      println!(
        "{}",
        serde_json::to_string(&json!({
          "database": descriptor.database(),
          "tables": schema.tables().iter().map(|x| &x.name).collect::<Vec<_>>(),
        }))?
      );
    }
    Command::Apply { config } => {
      let config = SeedConfig::load(config)?;
      let descriptor = parse_connection(&config.connection)?;
      let schema = parse_schema(&config.schema)?;
      let provisioner = Provisioner::new(Box::new(open_catalog(&opt)?));
      log::info!(
        "Applying {} tables to `{}`.",
        schema.tables().len(),
        descriptor.database()
      );
      let conn = provisioner.initialize(&descriptor, &schema).await?;

      let database = descriptor.database();
      let mut tables = vec![];
      for table in schema.tables() {
        let indexes = conn.list_indexes(database, &table.name).await?;
        tables.push(json!({
          "name": table.name,
          "indexes": indexes,
        }));
      }
      log::info!("Database `{}` is up to date.", database);
      println!(
        "{}",
        serde_json::to_string(&json!({
          "database": database,
          "tables": tables,
        }))?
      );
    }
    Command::List { database } => {
      let driver = open_catalog(&opt)?;
      let conn = driver
        .connect(&ConnectionDescriptor::new(
          database.clone().unwrap_or_default(),
        ))
        .await?;
      let out = match database {
        Some(database) => list_tables(&*conn, database).await?,
        None => json!(conn.list_databases().await?),
      };
      println!("{}", serde_json::to_string_pretty(&out)?);
    }
  }
  Ok(())
}

fn open_catalog(opt: &Opt) -> Result<SqliteDriver> {
  let path = opt.data.as_ref().ok_or(CliError::MissingDataFile)?;
  SqliteDriver::open(path)
}

async fn list_tables(conn: &dyn Connection, database: &str) -> Result<serde_json::Value> {
  let mut out = vec![];
  for table in conn.list_tables(database).await? {
    out.push(json!({
      "config": conn.table_config(database, &table).await?,
      "indexes": conn.index_status(database, &table).await?,
    }));
  }
  Ok(json!(out))
}
