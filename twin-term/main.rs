//! Headless host for the pane synchronizer.
//!
//! `twin sync` treats two files as the two panes: edits to either file are
//! converted into the other one. `twin convert` is a one-shot conversion and
//! `twin worker` serves the built-in converter to another `twin` process.

mod cli;
mod config;
mod file_pane;
mod logging;

use std::{
  io::{
    self,
    Write,
  },
  path::{
    Path,
    PathBuf,
  },
  sync::Arc,
  time::Duration,
};

use anyhow::{
  Context,
  Result,
  bail,
};
use clap::Parser;
use notify::{
  EventKind,
  RecursiveMode,
  Watcher,
};
use tokio::sync::mpsc;
use twin_core::{
  PaneId,
  ParseError,
  Span,
  file::{
    FileKind,
    classify_file_type,
    export,
    generate_filename,
    read_as_text,
  },
};
use twin_protocol::{
  ConverterGateway,
  FlatConverter,
  StdioWorker,
  WorkerThread,
  serve_stdio,
};
use twin_sync::{
  EditorPair,
  Views,
};

use crate::{
  cli::{
    Cli,
    Command,
  },
  config::{
    Config,
    ConverterSection,
  },
  file_pane::FilePane,
};

fn main() -> Result<()> {
  let cli = Cli::parse();

  let log_file = match cli.log_file {
    Some(path) => path,
    None => config::default_log_file()?,
  };
  logging::setup_logging(cli.verbosity, &log_file)?;
  let config = Config::load(cli.config_file.as_deref())?;

  match cli.command {
    Command::Worker => serve_worker(),
    Command::Convert {
      file,
      width,
      write,
      mappings,
    } => {
      runtime()?.block_on(convert(&config, &file, width, write, mappings))
    },
    Command::Sync { a, b } => runtime()?.block_on(sync(&config, &a, &b)),
  }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("failed to start the async runtime")
}

/// Must be called inside the runtime.
fn start_gateway(converter: &ConverterSection) -> Result<Arc<ConverterGateway>> {
  match &converter.command {
    Some(command) => {
      let (worker, events) = StdioWorker::spawn(command, &converter.args)
        .with_context(|| format!("failed to start converter `{command}`"))?;
      Ok(ConverterGateway::start(worker, events))
    },
    None => {
      let (worker, events) =
        WorkerThread::spawn(FlatConverter).context("failed to start the built-in converter")?;
      Ok(ConverterGateway::start(worker, events))
    },
  }
}

fn serve_worker() -> Result<()> {
  let stdin = io::stdin();
  let stdout = io::stdout();
  serve_stdio(&mut FlatConverter, stdin.lock(), stdout.lock()).context("converter worker failed")
}

fn source_pane(file: &Path) -> Result<PaneId> {
  let name = file.to_string_lossy();
  match classify_file_type(&name).pane() {
    Some(pane) => Ok(pane),
    None => bail!("cannot tell the format of {} from its extension", file.display()),
  }
}

fn format_span(span: Span) -> String {
  format!(
    "{}:{}-{}:{}",
    span.start.line + 1,
    span.start.column + 1,
    span.end.line + 1,
    span.end.column + 1
  )
}

async fn convert(
  config: &Config,
  file: &Path,
  width: Option<u32>,
  write: bool,
  show_mappings: bool,
) -> Result<()> {
  let pane = source_pane(file)?;
  let text = read_as_text(file)?;
  let gateway = start_gateway(&config.converter)?;

  let result = if show_mappings {
    gateway
      .convert_with_mapping(pane.direction(), &text)
      .await
      .map(|converted| (converted.output, converted.mappings))
  } else {
    gateway
      .convert(pane.direction(), &text, width.or(config.sync.width))
      .await
      .map(|output| (output, Vec::new()))
  };
  gateway.shutdown();
  let (output, mappings) =
    result.with_context(|| format!("failed to convert {}", file.display()))?;

  let mut stdout = io::stdout().lock();
  if write {
    let extension = FileKind::for_pane(pane.opposite()).extension();
    let target = file.with_file_name(generate_filename(&file.to_string_lossy(), extension));
    export(&output, &target)?;
    writeln!(stdout, "wrote {}", target.display())?;
  } else {
    stdout.write_all(output.as_bytes())?;
  }

  for mapping in &mappings {
    writeln!(
      stdout,
      "{} -> {}",
      format_span(mapping.source()),
      format_span(mapping.target())
    )?;
  }
  Ok(())
}

/// Absolute form of `path` as the file watcher reports it. The file itself
/// need not exist yet.
fn resolve(path: &Path) -> Result<PathBuf> {
  let Some(name) = path.file_name() else {
    bail!("{} is not a file path", path.display());
  };
  let parent = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  let parent = parent
    .canonicalize()
    .with_context(|| format!("directory {} does not exist", parent.display()))?;
  Ok(parent.join(name))
}

async fn sync(config: &Config, a: &Path, b: &Path) -> Result<()> {
  let a = resolve(a)?;
  let b = resolve(b)?;
  if source_pane(&a)? != PaneId::A || source_pane(&b)? != PaneId::B {
    bail!("expected a JSON file followed by a YAML file");
  }
  let text = read_as_text(&a)?;

  let gateway = start_gateway(&config.converter)?;
  let panes = [
    Arc::new(FilePane::new(PaneId::A, a)),
    Arc::new(FilePane::new(PaneId::B, b)),
  ];
  let pair = EditorPair::new(
    gateway,
    Views::new(panes[0].clone(), panes[1].clone()),
    config.sync_config(),
  );
  for pane in &panes {
    pane.attach(pair.pane(pane.pane()).clone());
  }

  pair.panes().lock().pane_mut(PaneId::B).filename = panes[1].file_name().map(str::to_string);
  pair.pane(PaneId::A).on_import(panes[0].file_name(), &text);

  let (event_tx, mut event_rx) = mpsc::unbounded_channel();
  let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
    match event {
      Ok(event) => {
        let _ = event_tx.send(event);
      },
      Err(err) => log::warn!("file watcher error: {err}"),
    }
  })
  .context("failed to create file watcher")?;

  let mut dirs: Vec<&Path> = panes.iter().filter_map(|pane| pane.path().parent()).collect();
  dirs.dedup();
  for dir in dirs {
    watcher
      .watch(dir, RecursiveMode::NonRecursive)
      .with_context(|| format!("failed to watch {}", dir.display()))?;
  }
  eprintln!(
    "syncing {} <-> {} (ctrl-c to stop)",
    panes[0].path().display(),
    panes[1].path().display()
  );

  let mut reported: [Option<ParseError>; 2] = [None, None];
  let mut status = tokio::time::interval(Duration::from_millis(100));
  loop {
    tokio::select! {
      Some(event) = event_rx.recv() => on_file_event(&pair, &panes, &event),
      _ = status.tick() => report_errors(&pair, &panes, &mut reported),
      result = tokio::signal::ctrl_c() => {
        result.context("failed to listen for ctrl-c")?;
        break;
      }
    }
  }

  drop(watcher);
  pair.shutdown();
  Ok(())
}

/// Forward outside edits. Content equal to what the pane already holds is
/// our own write and is skipped.
fn on_file_event(pair: &EditorPair, panes: &[Arc<FilePane>], event: &notify::Event) {
  if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
    return;
  }
  for pane in panes {
    if !event.paths.iter().any(|path| pane.is_path(path)) {
      continue;
    }
    let text = match read_as_text(pane.path()) {
      Ok(text) => text,
      Err(err) => {
        log::warn!("{err}");
        continue;
      },
    };
    if pair.snapshot(pane.pane()).content != text {
      pair.pane(pane.pane()).on_change(&text, None);
    }
  }
}

fn report_errors(pair: &EditorPair, panes: &[Arc<FilePane>], reported: &mut [Option<ParseError>; 2]) {
  for (pane, last) in panes.iter().zip(reported.iter_mut()) {
    let error = pair.snapshot(pane.pane()).error;
    if error == *last {
      continue;
    }
    let name = pane.file_name().unwrap_or(pane.pane().name());
    match &error {
      Some(err) => eprintln!("{name}: {err}"),
      None => eprintln!("{name}: ok"),
    }
    *last = error;
  }
}
