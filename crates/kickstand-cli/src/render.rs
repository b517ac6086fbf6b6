use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use kickstand_core::{ProgressReporter, Transfer, MAX_IN_FLIGHT_PERCENT};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stderr().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    if style == OutputStyle::Plain {
        return message.to_string();
    }

    let (badge, badge_style) = match status {
        "ok" => ("[OK]", ok_style()),
        "warn" => ("[WARN]", warn_style()),
        "err" => ("[ERR]", err_style()),
        _ => ("[..]", step_style()),
    };
    format!("{} {message}", colorize(badge_style, badge))
}

/// Text progress on stderr, one bar per stage label.
pub(crate) struct ConsoleReporter {
    style: OutputStyle,
    label: Option<String>,
    progress_bar: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self {
            style,
            label: None,
            progress_bar: None,
        }
    }

    fn start_stage(&mut self, label: &str) {
        self.clear_bar();
        self.label = Some(label.to_string());

        if self.style == OutputStyle::Plain {
            eprintln!("{}", render_status_line(self.style, "step", label));
            return;
        }

        let progress_bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} {msg:<24} [{bar:20.cyan/blue}] {pos:>3}%",
        ) {
            progress_bar.set_style(style.tick_chars("|/-\\ ").progress_chars("=>-"));
        }
        progress_bar.set_message(label.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        self.progress_bar = Some(progress_bar);
    }

    fn clear_bar(&mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn report(&mut self, percent: u8, label: &str) -> Transfer {
        if self.label.as_deref() != Some(label) {
            self.start_stage(label);
        }
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_position(u64::from(percent.min(MAX_IN_FLIGHT_PERCENT)));
        }
        Transfer::Continue
    }

    fn complete(&mut self, label: &str) {
        self.clear_bar();
        self.label = None;
        eprintln!("{}", render_status_line(self.style, "ok", label));
    }

    fn close(&mut self) {
        self.clear_bar();
        self.label = None;
    }
}

/// A window with a label and a 0..=100 bar. `set_value` returns
/// [`Transfer::Abort`] once the user has dismissed it.
pub(crate) trait ProgressDialog {
    fn set_text(&mut self, text: &str);

    fn set_value(&mut self, value: u8) -> Transfer;

    fn close(&mut self);
}

/// Drives a [`ProgressDialog`], holding back 100 until the stage completes.
pub(crate) struct ModalReporter {
    dialog: Box<dyn ProgressDialog>,
    label: Option<String>,
    last: Option<u8>,
    closed: bool,
}

impl ModalReporter {
    pub(crate) fn new(dialog: Box<dyn ProgressDialog>) -> Self {
        Self {
            dialog,
            label: None,
            last: None,
            closed: false,
        }
    }
}

impl ProgressReporter for ModalReporter {
    fn report(&mut self, percent: u8, label: &str) -> Transfer {
        if self.label.as_deref() != Some(label) {
            self.dialog.set_text(label);
            self.label = Some(label.to_string());
            self.last = None;
        }

        let value = percent.min(MAX_IN_FLIGHT_PERCENT);
        if self.last == Some(value) {
            return Transfer::Continue;
        }
        self.last = Some(value);
        self.dialog.set_value(value)
    }

    fn complete(&mut self, _label: &str) {
        if self.last != Some(100) {
            let _ = self.dialog.set_value(100);
            self.last = Some(100);
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.dialog.close();
            self.closed = true;
        }
    }
}

fn ok_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightGreen.into()))
        .effects(Effects::BOLD)
}

fn warn_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightYellow.into()))
        .effects(Effects::BOLD)
}

fn err_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn step_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
