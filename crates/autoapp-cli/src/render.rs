use std::cell::RefCell;
use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use autoapp_installer::Reporter;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    /// Not attached to a terminal, e.g. a scheduled run writing to a log.
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::io::stdout().is_terminal() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

/// Prints reporter output to the terminal, timestamped when plain.
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
    spinner: RefCell<Option<ProgressBar>>,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self {
            style,
            spinner: RefCell::new(None),
        }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(&self) -> OutputStyle {
        self.style
    }

    fn timestamp(&self) -> Option<String> {
        plain_timestamp(self.style)
    }
}

impl Reporter for TerminalRenderer {
    fn info(&self, line: &str) {
        self.clear_status();
        println!("{}", render_info_line(self.style, self.timestamp().as_deref(), line));
    }

    fn error(&self, line: &str) {
        self.clear_status();
        eprintln!("{}", render_error_line(self.style, self.timestamp().as_deref(), line));
    }

    fn status(&self, line: &str) {
        match self.style {
            OutputStyle::Plain => {
                println!(
                    "\x1b[1A{}",
                    render_info_line(self.style, self.timestamp().as_deref(), line)
                );
            }
            OutputStyle::Rich => {
                let mut spinner = self.spinner.borrow_mut();
                let bar = spinner.get_or_insert_with(|| {
                    let bar = ProgressBar::new_spinner();
                    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
                        bar.set_style(style.tick_chars("|/-\\ "));
                    }
                    bar.enable_steady_tick(Duration::from_millis(120));
                    bar
                });
                bar.set_message(line.to_string());
            }
        }
    }

    fn clear_status(&self) {
        if let Some(bar) = self.spinner.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}

/// Prints a failure that ended the run. Empty messages print nothing.
pub(crate) fn report_fatal(err: &anyhow::Error, debug: bool) {
    let message = err.to_string();
    if !message.is_empty() {
        let style = current_output_style();
        let timestamp = plain_timestamp(style);
        eprintln!("{}", render_error_line(style, timestamp.as_deref(), &message));
    }
    if debug {
        eprintln!("{err:?}");
    }
}

fn plain_timestamp(style: OutputStyle) -> Option<String> {
    match style {
        OutputStyle::Plain => Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        OutputStyle::Rich => None,
    }
}

pub(crate) fn render_info_line(style: OutputStyle, timestamp: Option<&str>, line: &str) -> String {
    let body = match style {
        OutputStyle::Plain => line.to_string(),
        OutputStyle::Rich => colorize_marker(line),
    };
    match timestamp {
        Some(timestamp) => format!("{timestamp} {body}"),
        None => body,
    }
}

pub(crate) fn render_error_line(style: OutputStyle, timestamp: Option<&str>, line: &str) -> String {
    let body = format!("! {line}");
    let body = match style {
        OutputStyle::Plain => body,
        OutputStyle::Rich => colorize(error_style(), &body),
    };
    match timestamp {
        Some(timestamp) => format!("{timestamp} {body}"),
        None => body,
    }
}

// Colours the leading `+ `, `- `, `* ` or `! ` marker of a script line.
fn colorize_marker(line: &str) -> String {
    let style = match line.get(..2) {
        Some("+ ") => added_style(),
        Some("- ") => removed_style(),
        Some("* ") => updated_style(),
        Some("! ") => error_style(),
        _ => return line.to_string(),
    };
    format!("{}{}", colorize(style, &line[..1]), &line[1..])
}

fn added_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightGreen.into()))
        .effects(Effects::BOLD)
}

fn removed_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightYellow.into()))
}

fn updated_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightCyan.into()))
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
