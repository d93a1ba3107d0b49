//! Single-shot flow
//!
//! Line-mode front end for one query given on the command line or stdin. It
//! prints the suggested steps and asks about each command in turn, driving
//! the same controller transitions the TUI does.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info};

use crate::exec::Mode;
use crate::plan::Step;
use crate::session::{Controller, Disposition, Msg, Screen, StepStatus};

/// Operator answer to a per-step prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

impl Answer {
    /// `yes`/`y` approve, `cancel`/`c` abandon, anything else declines
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "yes" | "y" => Answer::Yes,
            "cancel" | "c" => Answer::Cancel,
            _ => Answer::No,
        }
    }

    fn disposition(self) -> Disposition {
        match self {
            Answer::Yes => Disposition::Approve,
            Answer::No => Disposition::Skip,
            Answer::Cancel => Disposition::Cancel,
        }
    }
}

/// Source of per-step answers
pub trait Prompter {
    fn ask(&mut self, prompt: &str) -> Result<Answer>;
}

/// Prompter backed by a readline editor
pub struct ReadlinePrompter {
    editor: DefaultEditor,
}

impl ReadlinePrompter {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;
        Ok(Self { editor })
    }
}

impl Prompter for ReadlinePrompter {
    fn ask(&mut self, prompt: &str) -> Result<Answer> {
        match self.editor.readline(&format!("{} ", prompt.bright_yellow())) {
            Ok(line) => Ok(Answer::parse(&line)),
            // Ctrl+C / Ctrl+D abandon the rest of the plan
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(Answer::Cancel),
            Err(err) => Err(eyre::eyre!("Readline error: {}", err)),
        }
    }
}

/// Prompter reading plain answer lines from any reader
///
/// Used on the controlling terminal when stdin carried the query. End of
/// input abandons the rest of the plan.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl LinePrompter<BufReader<File>, File> {
    /// Prompt on `/dev/tty`
    pub fn tty() -> std::io::Result<Self> {
        let input = File::open("/dev/tty")?;
        let output = OpenOptions::new().write(true).open("/dev/tty")?;
        debug!("LinePrompter::tty: opened controlling terminal");
        Ok(Self::new(BufReader::new(input), output))
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn ask(&mut self, prompt: &str) -> Result<Answer> {
        write!(self.output, "{} ", prompt.bright_yellow())?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(Answer::Cancel);
        }
        Ok(Answer::parse(&line))
    }
}

/// Run one query through plan retrieval and step confirmation
///
/// Retrieval failures and empty plans are reported on `out` and are not
/// errors; only prompt or output failures return `Err`.
pub async fn run(
    controller: &mut Controller,
    query: &str,
    mode: Mode,
    prompter: &mut dyn Prompter,
    out: &mut dyn Write,
) -> Result<()> {
    info!(%query, %mode, "Single-shot run");
    for input in ["query", query, mode.as_str()] {
        controller.handle(Msg::Paste(input.to_string()));
        controller.handle(Msg::Submit);
        if controller.state().last_error.is_some() {
            report_error(controller, out)?;
            return Ok(());
        }
    }

    writeln!(out, "{}", "Thinking...".dimmed())?;
    controller.settle().await;
    if controller.state().screen != Screen::Steps {
        report_error(controller, out)?;
        return Ok(());
    }

    print_plan(controller, out)?;

    while let Some(step) = controller.state().current_step().cloned() {
        let answer = if step.runnable_command().is_some() {
            prompter.ask(&format!("Run step {}? (yes/no/cancel)", step.number))?
        } else {
            Answer::Yes
        };
        debug!(step = step.number, ?answer, "oneshot::run: answer");

        controller.handle(Msg::Confirm(answer.disposition()));
        if answer == Answer::Cancel {
            writeln!(out, "{}", "Cancelled, remaining steps abandoned.".yellow())?;
            return Ok(());
        }
        controller.settle().await;
        print_outcome(controller, &step, out)?;
    }

    let state = controller.state();
    let failed = state.count_records(|s| matches!(s, StepStatus::Failed { .. }));
    writeln!(out)?;
    writeln!(out, "{} ({} failed)", "Done.".bright_green().bold(), failed)?;
    if mode == Mode::WriteToFile {
        let written = state.count_records(|s| matches!(s, StepStatus::Written { .. }));
        writeln!(out, "{} command(s) written", written)?;
    }
    Ok(())
}

fn report_error(controller: &Controller, out: &mut dyn Write) -> Result<()> {
    let message = controller.state().last_error.as_deref().unwrap_or("no plan");
    writeln!(out, "{} {}", "Error:".red().bold(), message)?;
    Ok(())
}

fn print_plan(controller: &Controller, out: &mut dyn Write) -> Result<()> {
    let Some(plan) = controller.state().active_plan.as_ref() else {
        return Ok(());
    };
    writeln!(out, "{}", "Suggested steps:".bright_cyan().bold())?;
    for step in plan.steps() {
        writeln!(out, "  Step {}: {}", step.number, step.description)?;
        if !step.rationale.is_empty() {
            writeln!(out, "    {}", step.rationale.dimmed())?;
        }
        if let Some(command) = step.runnable_command() {
            writeln!(out, "    $ {}", command.bright_blue())?;
        }
    }
    writeln!(out)?;
    Ok(())
}

fn print_outcome(controller: &Controller, step: &Step, out: &mut dyn Write) -> Result<()> {
    let Some(record) = controller.state().record_for(step.number) else {
        return Ok(());
    };
    match &record.status {
        StepStatus::Executed { output } => {
            if !output.trim().is_empty() {
                writeln!(out, "{}", output.trim_end())?;
            }
            writeln!(out, "{} step {}", "✓".green(), step.number)?;
        }
        StepStatus::Written { command } => writeln!(out, "{} wrote: {}", "✓".green(), command)?,
        StepStatus::Failed { message, output } => {
            if !output.trim().is_empty() {
                writeln!(out, "{}", output.trim_end())?;
            }
            writeln!(out, "{} step {}: {}", "✗".red(), step.number, message)?;
        }
        StepStatus::Skipped => writeln!(out, "{} step {} skipped", "-".dimmed(), step.number)?,
        StepStatus::Acknowledged => {}
    }
    Ok(())
}
