use anyhow::Result;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigFileError {
  #[error("config file must be a mapping")]
  NotAMapping,

  #[error("config file is missing `{0}`")]
  MissingKey(&'static str),
}

/// The two halves of a config file, still untyped so that the core's
/// shape checks report on them.
#[derive(Debug)]
pub struct SeedConfig {
  pub connection: Value,
  pub schema: Value,
}

impl SeedConfig {
  pub fn load(path: &str) -> Result<Self> {
    let text = std::fs::read_to_string(path)?;
    Self::parse(&text)
  }

  pub fn parse(text: &str) -> Result<Self> {
    let doc: Value = serde_yaml::from_str(text)?;
    let doc = match doc {
      Value::Object(x) => x,
      _ => return Err(ConfigFileError::NotAMapping.into()),
    };
    let take = |key: &'static str| {
      doc
        .get(key)
        .cloned()
        .ok_or(ConfigFileError::MissingKey(key))
    };
    Ok(Self {
      connection: take("connection")?,
      schema: take("schema")?,
    })
  }
}
