use std::path::PathBuf;

use clap::{
  ArgAction,
  Parser,
  Subcommand,
};

#[derive(Parser, Debug)]
#[command(
  name = "twin",
  about = "Keep a JSONC and a YAML document in sync",
  version,
  long_about = None
)]
pub struct Cli {
  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count, global = true)]
  pub verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE", global = true)]
  pub log_file: Option<PathBuf>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
  pub config_file: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Convert one file to the other format
  Convert {
    /// A .json/.jsonc or .yaml/.yml file
    file: PathBuf,

    /// Width hint passed to the converter
    #[arg(long, value_name = "N")]
    width: Option<u32>,

    /// Write the result next to the input instead of printing it
    #[arg(long)]
    write: bool,

    /// Also print the source mappings
    #[arg(long)]
    mappings: bool,
  },
  /// Watch two files and propagate edits between them
  Sync {
    /// The JSONC side
    #[arg(value_name = "FILE_A")]
    a: PathBuf,

    /// The YAML side
    #[arg(value_name = "FILE_B")]
    b: PathBuf,
  },
  /// Serve the built-in converter over stdio
  #[command(hide = true)]
  Worker,
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn cli_is_well_formed() {
    Cli::command().debug_assert();
  }

  #[test]
  fn global_flags_work_after_the_subcommand() {
    let cli = Cli::try_parse_from(["twin", "sync", "a.jsonc", "b.yaml", "-vv", "--log", "x.log"])
      .unwrap();
    assert_eq!(cli.verbosity, 2);
    assert_eq!(cli.log_file, Some(PathBuf::from("x.log")));
    assert!(matches!(cli.command, Command::Sync { .. }));
  }

  #[test]
  fn convert_options() {
    let cli = Cli::try_parse_from(["twin", "convert", "in.yaml", "--width", "60", "--write"])
      .unwrap();
    let Command::Convert {
      file,
      width,
      write,
      mappings,
    } = cli.command
    else {
      panic!("expected convert");
    };
    assert_eq!(file, PathBuf::from("in.yaml"));
    assert_eq!(width, Some(60));
    assert!(write);
    assert!(!mappings);
  }
}
