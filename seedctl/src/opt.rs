use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "seedctl", about = "Bring a database up to a declared schema.")]
pub struct Opt {
  /// SQLite catalog file.
  #[structopt(long)]
  pub data: Option<String>,

  #[structopt(subcommand)]
  pub cmd: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
  /// Create whatever the config declares and is missing.
  Apply {
    /// Path to the YAML config.
    config: String,
  },

  /// Validate a config without touching any database.
  Check {
    /// Path to the YAML config.
    config: String,
  },

  /// List databases, or the tables of one database.
  List { database: Option<String> },
}
