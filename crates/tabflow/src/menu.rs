use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use tabflow_core::{
    ApplyOutcome, InterruptRelay, LoadOutcome, Orchestrator, ParameterSource, PipelineConfig, PipelineError,
    PipelineJob, PipelineState, Result, Scheduler, TransformOp,
};
use tabflow_parser::{list_sqlite_tables, SourceFormat, SourceRequest, TableSelection};
use tracing::{error, warn};

use crate::display::render_preview;
use crate::prompt::ConsolePrompter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainChoice {
    Load,
    Transform,
    Finalize,
    Schedule,
    View,
    Exit,
}

impl MainChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MainChoice::Load),
            "2" => Some(MainChoice::Transform),
            "3" => Some(MainChoice::Finalize),
            "4" => Some(MainChoice::Schedule),
            "5" => Some(MainChoice::View),
            "6" => Some(MainChoice::Exit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformChoice {
    Clean,
    Filter,
    Aggregate,
    Finish,
    View,
    Discard,
    Deduplicate,
}

impl TransformChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(TransformChoice::Clean),
            "2" => Some(TransformChoice::Filter),
            "3" => Some(TransformChoice::Aggregate),
            "4" => Some(TransformChoice::Finish),
            "5" => Some(TransformChoice::View),
            "6" => Some(TransformChoice::Discard),
            "7" => Some(TransformChoice::Deduplicate),
            _ => None,
        }
    }
}

const MAIN_MENU: &str = "\
  1) Load a source
  2) Transform working data
  3) Finalize (write output)
  4) Run on schedule
  5) View current data
  6) Exit";

const TRANSFORM_MENU: &str = "\
  1) Clean text columns
  2) Filter rows
  3) Aggregate
  4) Finish transforming
  5) View data
  6) Discard run
  7) Deduplicate rows";

/// The interactive command loop. Per-command failures are reported and the loop
/// carries on until Exit or end of input.
pub struct Menu<R, W> {
    prompter: ConsolePrompter<R, W>,
    orchestrator: Orchestrator,
    config: PipelineConfig,
    interrupts: Option<InterruptRelay>,
}

impl<R: BufRead, W: Write> Menu<R, W> {
    pub fn new(config: PipelineConfig, input: R, output: W) -> Self {
        Self {
            prompter: ConsolePrompter::new(input, output),
            orchestrator: Orchestrator::from_config(&config),
            config,
            interrupts: None,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            let status = self.status_line();
            self.prompter.say(&format!("\n=== tabflow === {status}\n{MAIN_MENU}"))?;
            let answer = match self.prompter.ask("Choose an option [1-6]:") {
                Ok(answer) => answer,
                Err(PipelineError::UserCancelled) => break,
                Err(err) => return Err(err),
            };
            let Some(choice) = MainChoice::parse(&answer) else {
                self.prompter
                    .say(&format!("Invalid choice '{answer}'. Enter a number from 1 to 6."))?;
                continue;
            };

            let result = match choice {
                MainChoice::Load => self.load(),
                MainChoice::Transform => self.transform(),
                MainChoice::Finalize => self.finalize(),
                MainChoice::Schedule => self.schedule().await,
                MainChoice::View => self.view(),
                MainChoice::Exit => break,
            };
            if let Err(err) = result {
                self.report(err)?;
            }
        }

        if matches!(
            self.orchestrator.state(),
            PipelineState::Loaded | PipelineState::Transforming | PipelineState::FinalizePending
        ) {
            self.prompter.say("Unsaved working data was not written.")?;
        }
        self.prompter.say("Goodbye.")
    }

    fn status_line(&self) -> String {
        match self.orchestrator.current() {
            Some(table) => format!(
                "[{}: {} rows x {} columns]",
                self.orchestrator.state(),
                table.height(),
                table.width()
            ),
            None => format!("[{}]", self.orchestrator.state()),
        }
    }

    fn report(&mut self, err: PipelineError) -> Result<()> {
        match err {
            PipelineError::UserCancelled => self.prompter.say("Cancelled."),
            PipelineError::Io(err) => Err(PipelineError::Io(err)),
            other => {
                warn!(error = %other, "command failed");
                self.prompter.say(&format!("Error: {other}"))
            }
        }
    }

    fn load(&mut self) -> Result<()> {
        let request = self.pick_source()?;
        match self.orchestrator.load(&request)? {
            LoadOutcome::Loaded {
                rows,
                columns,
                staged_path,
            } => self.prompter.say(&format!(
                "Loaded {rows} rows x {columns} columns. Raw snapshot: {}",
                staged_path.display()
            )),
            LoadOutcome::Empty { path } => self.prompter.say(&format!(
                "{} has no rows; working data unchanged.",
                path.display()
            )),
        }
    }

    fn source_candidates(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = match fs::read_dir(&self.config.paths.source_dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file() && SourceFormat::from_path(path).is_ok())
                .collect(),
            Err(err) => {
                warn!(
                    dir = %self.config.paths.source_dir.display(),
                    error = %err,
                    "cannot list source directory"
                );
                Vec::new()
            }
        };
        files.sort();
        files
    }

    fn pick_source(&mut self) -> Result<SourceRequest> {
        let candidates = self.source_candidates();
        if candidates.is_empty() {
            self.prompter.say(&format!(
                "No .csv, .txt, .db or .sqlite files in {}.",
                self.config.paths.source_dir.display()
            ))?;
        } else {
            self.prompter.say("Sources:")?;
            for (idx, path) in candidates.iter().enumerate() {
                self.prompter
                    .say(&format!("  [{}] {}", idx + 1, path.display()))?;
            }
        }

        let path = loop {
            let answer = self
                .prompter
                .ask("Select a source by number or path ('skip' to cancel):")?;
            if answer.is_empty() || answer.eq_ignore_ascii_case("skip") {
                return Err(PipelineError::UserCancelled);
            }
            match answer.parse::<usize>() {
                Ok(position) => match candidates.get(position.wrapping_sub(1)) {
                    Some(path) => break path.clone(),
                    None => self.prompter.say(&format!("No source number {position}."))?,
                },
                Err(_) => break PathBuf::from(answer),
            }
        };

        let request = SourceRequest::new(path);
        if SourceFormat::from_path(&request.path)? != SourceFormat::Sqlite {
            return Ok(request);
        }

        let tables = list_sqlite_tables(&request.path)?;
        if tables.is_empty() {
            return Ok(request);
        }
        self.prompter.say("Tables:")?;
        for (idx, name) in tables.iter().enumerate() {
            self.prompter.say(&format!("  [{}] {name}", idx + 1))?;
        }
        loop {
            let answer = self.prompter.ask("Table (name or number):")?;
            if answer.is_empty() {
                return Err(PipelineError::UserCancelled);
            }
            let selection = TableSelection::parse(&answer);
            match selection.resolve(&tables) {
                Ok(_) => return Ok(request.with_table(selection)),
                Err(err) => self.prompter.say(&err.to_string())?,
            }
        }
    }

    fn transform(&mut self) -> Result<()> {
        self.orchestrator.begin_transform()?;
        loop {
            let status = self.status_line();
            self.prompter
                .say(&format!("\n--- transform --- {status}\n{TRANSFORM_MENU}"))?;
            let answer = match self.prompter.ask("Choose an option [1-7]:") {
                Ok(answer) => answer,
                Err(PipelineError::UserCancelled) => return Ok(()),
                Err(err) => return Err(err),
            };
            let Some(choice) = TransformChoice::parse(&answer) else {
                self.prompter
                    .say(&format!("Invalid choice '{answer}'. Enter a number from 1 to 7."))?;
                continue;
            };

            let result = match choice {
                TransformChoice::Finish => {
                    self.orchestrator.finish()?;
                    return self
                        .prompter
                        .say("Changes committed. Choose Finalize to write the output.");
                }
                TransformChoice::Discard => {
                    let answer = self.prompter.ask("Discard this run and all changes? [y/N]:")?;
                    if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
                        self.orchestrator.discard()?;
                        return self.prompter.say("Run discarded; nothing was written.");
                    }
                    Ok(())
                }
                TransformChoice::View => self.view(),
                TransformChoice::Clean
                | TransformChoice::Filter
                | TransformChoice::Aggregate
                | TransformChoice::Deduplicate => self.collect_and_apply(choice),
            };
            if let Err(err) = result {
                self.report(err)?;
            }
        }
    }

    fn collect_and_apply(&mut self, choice: TransformChoice) -> Result<()> {
        let table = self
            .orchestrator
            .current()
            .ok_or(PipelineError::NoWorkingData)?;
        let op = match choice {
            TransformChoice::Clean => TransformOp::Clean(self.prompter.clean_params(table)?),
            TransformChoice::Filter => TransformOp::Filter(self.prompter.filter_predicate(table)?),
            TransformChoice::Aggregate => {
                TransformOp::Aggregate(self.prompter.aggregation_spec(table)?)
            }
            TransformChoice::Deduplicate => TransformOp::Deduplicate {
                keys: self.prompter.dedupe_keys(table)?,
            },
            _ => return Ok(()),
        };

        match self.orchestrator.apply(&op)? {
            ApplyOutcome::Applied { rows, columns } => self
                .prompter
                .say(&format!("Applied {op}: {rows} rows x {columns} columns.")),
            ApplyOutcome::Emptied { columns } => self.prompter.say(&format!(
                "Applied {op}: no rows remain ({columns} columns). Discard the run to start over."
            )),
            ApplyOutcome::NoChange => self.prompter.say(&format!("{op}: data unchanged.")),
        }
    }

    fn finalize(&mut self) -> Result<()> {
        let path = self.orchestrator.finalize()?;
        self.prompter
            .say(&format!("Final output written to {}", path.display()))
    }

    async fn schedule(&mut self) -> Result<()> {
        let schedule = &self.config.schedule;
        self.prompter.say(&format!(
            "Running the automated pipeline on {} every {}s. Press Ctrl+C to return to the menu.",
            schedule.default_source.display(),
            schedule.interval_secs
        ))?;

        let relay = self.interrupt_relay();
        let mut job = PipelineJob::from_config(&self.config);
        let mut scheduler = Scheduler::from_config(&self.config.schedule, Instant::now());
        let shutdown = relay.arm();
        let summary = scheduler.run_until(&mut job, shutdown).await;
        relay.disarm();

        self.prompter.say(&format!(
            "Scheduler stopped after {} runs ({} failed, {} deferred).",
            summary.runs, summary.failures, summary.deferred
        ))
    }

    /// Once the runtime owns SIGINT the default "Ctrl+C exits" behaviour is
    /// gone, so a single listener takes it over: an armed scheduler loop is
    /// stopped, otherwise the process exits.
    fn interrupt_relay(&mut self) -> InterruptRelay {
        if let Some(relay) = &self.interrupts {
            return relay.clone();
        }
        let relay = InterruptRelay::new();
        let listener = relay.clone();
        tokio::spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!(error = %err, "failed to listen for Ctrl+C");
                    return;
                }
                if !listener.deliver() {
                    std::process::exit(130);
                }
            }
        });
        self.interrupts = Some(relay.clone());
        relay
    }

    fn view(&mut self) -> Result<()> {
        let Some(table) = self.orchestrator.current() else {
            return self.prompter.say(&format!(
                "No working data (state: {}).",
                self.orchestrator.state()
            ));
        };
        let mut text = String::new();
        if let Some(source) = self.orchestrator.source() {
            text.push_str(&format!("Source: {}\n", source.display()));
        }
        for (idx, step) in self.orchestrator.history().iter().enumerate() {
            text.push_str(&format!("Step {}: {step}\n", idx + 1));
        }
        text.push_str(&render_preview(table, self.config.output.preview_rows)?);
        self.prompter.say(text.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tabflow_core::seed;
    use tabflow_parser::load_source;

    use super::*;

    fn config(root: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths.source_dir = root.join("source");
        config.paths.staging_dir = root.join("staging");
        config.paths.warehouse_dir = root.join("warehouse");
        config.ensure_directories().unwrap();
        config
    }

    fn warehouse_files(root: &std::path::Path) -> Vec<PathBuf> {
        fs::read_dir(root.join("warehouse"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn menu_choices_parse() {
        assert_eq!(MainChoice::parse(" 4 "), Some(MainChoice::Schedule));
        assert_eq!(MainChoice::parse("7"), None);
        assert_eq!(TransformChoice::parse("7"), Some(TransformChoice::Deduplicate));
        assert_eq!(TransformChoice::parse("clean"), None);
    }

    #[tokio::test]
    async fn scripted_session_loads_transforms_and_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        seed::write_sample_csv(&dir.path().join("source/data.csv")).unwrap();

        let script = "\
9
1
1
2
2
state
california
7
id
4
3
6
";
        let mut menu = Menu::new(config, Cursor::new(script.as_bytes().to_vec()), Vec::new());
        menu.run().await.unwrap();

        assert_eq!(menu.orchestrator().state(), PipelineState::Finalized);
        let files = warehouse_files(dir.path());
        assert_eq!(files.len(), 1);
        let written = load_source(&SourceRequest::new(&files[0])).unwrap();
        assert_eq!(written.height(), 3);

        let output = String::from_utf8(menu.prompter.output().clone()).unwrap();
        assert!(output.contains("Invalid choice '9'"));
        assert!(output.contains("Final output written to"));
    }

    #[tokio::test]
    async fn errors_are_reported_without_leaving_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let missing = dir.path().join("source/nowhere.json");

        let script = format!("3\n2\n1\n{}\n1\nskip\n", missing.display());
        let mut menu = Menu::new(config, Cursor::new(script.into_bytes()), Vec::new());
        menu.run().await.unwrap();

        let output = String::from_utf8(menu.prompter.output().clone()).unwrap();
        assert!(output.contains("No working data"));
        assert!(output.contains("Unsupported source format"));
        assert!(output.contains("Cancelled."));
        assert!(output.contains("Goodbye."));
        assert_eq!(menu.orchestrator().state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn missing_database_is_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let missing = dir.path().join("source/absent.db");

        let script = format!("1\n{}\n6\n", missing.display());
        let mut menu = Menu::new(config, Cursor::new(script.into_bytes()), Vec::new());
        menu.run().await.unwrap();

        let output = String::from_utf8(menu.prompter.output().clone()).unwrap();
        assert!(output.contains("Error: Source file not found"), "{output}");
        assert!(!missing.exists());
        assert_eq!(menu.orchestrator().state(), PipelineState::Idle);
    }
}
