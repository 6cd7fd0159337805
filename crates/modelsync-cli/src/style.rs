use std::env;

use color_eyre::owo_colors::OwoColorize;
use modelsync_core::CommandStatus;

/// How a row of the file table is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTone {
    /// Fetched, repaired or already up to date.
    Settled,
    /// Dry run: nothing was written.
    Planned,
    /// Left alone: failed upstream scan or unusable name.
    Skipped,
    /// On disk but its digest differs from the catalog.
    Mismatch,
}

pub struct Style {
    enabled: bool,
}

impl Style {
    pub fn new(force_no_color: bool, is_tty: bool) -> Self {
        let env_no_color = env::var_os("NO_COLOR").is_some();
        Self {
            enabled: !(force_no_color || env_no_color) && is_tty,
        }
    }

    pub fn status(&self, status: &CommandStatus, text: &str) -> String {
        let symbol = match status {
            CommandStatus::Ok => "✔",
            CommandStatus::UserError => "✗",
            CommandStatus::Failure => "✖",
        };
        self.paint(&format!("{symbol} {text}"), |line| match status {
            CommandStatus::Ok => line.green().bold().to_string(),
            CommandStatus::UserError => line.yellow().bold().to_string(),
            CommandStatus::Failure => line.red().bold().to_string(),
        })
    }

    pub fn hint(&self, text: &str) -> String {
        self.paint(text, |line| line.cyan().to_string())
    }

    pub fn file(&self, text: &str, tone: FileTone) -> String {
        self.paint(text, |cell| match tone {
            FileTone::Settled => cell.green().to_string(),
            FileTone::Planned => cell.cyan().to_string(),
            FileTone::Skipped => cell.yellow().to_string(),
            FileTone::Mismatch => cell.red().bold().to_string(),
        })
    }

    fn paint(&self, text: &str, render: impl FnOnce(&str) -> String) -> String {
        if self.enabled {
            render(text)
        } else {
            text.to_string()
        }
    }
}
