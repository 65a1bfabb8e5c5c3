//! Notification rendering: colored text lines or JSON lines.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;

use explorer_stream::{ConnectionState, Notification};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

pub struct Printer {
    format: OutputFormat,
    color: bool,
}

impl Printer {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    pub fn render(&self, notification: &Notification) -> Result<String, CliError> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string(notification)?),
            OutputFormat::Text => Ok(self.render_text(notification)),
        }
    }

    pub fn print(&self, notification: &Notification) -> Result<(), CliError> {
        let line = self.render(notification)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }

    fn render_text(&self, notification: &Notification) -> String {
        let (tag, body) = match notification {
            Notification::StateChange { state } => ("state", state.to_string()),
            Notification::Connected { server_info } => ("connected", server_info.to_string()),
            Notification::Message { data } => ("message", data.to_string()),
            Notification::FileChange(change) => (change.change.as_str(), change.path.clone()),
            Notification::StructureUpdate(update) => ("structure", update.watcher().to_owned()),
            Notification::Disconnected { reason } => ("disconnected", reason.to_string()),
            Notification::Error { detail } => ("error", detail.clone()),
            Notification::ReconnectFailed { attempts } => {
                ("gave-up", format!("after {attempts} attempts"))
            }
            Notification::Unknown { name, data } => ("unknown", format!("{name} {data}")),
        };
        let tag = format!("{tag:<12}");
        if !self.color {
            return format!("{tag} {body}");
        }
        let tag = match notification {
            Notification::StateChange {
                state: ConnectionState::Connected,
            }
            | Notification::Connected { .. } => tag.green().to_string(),
            Notification::StateChange { .. } => tag.dimmed().to_string(),
            Notification::FileChange(_) | Notification::StructureUpdate(_) => {
                tag.cyan().to_string()
            }
            Notification::Disconnected { .. } | Notification::Unknown { .. } => {
                tag.yellow().to_string()
            }
            Notification::Error { .. } | Notification::ReconnectFailed { .. } => {
                tag.red().bold().to_string()
            }
            Notification::Message { .. } => tag.blue().to_string(),
        };
        format!("{tag} {body}")
    }
}

#[cfg(test)]
mod tests {
    use explorer_stream::{ChangeType, DisconnectReason, FileChange};

    use super::*;

    #[test]
    fn text_lines_are_aligned_and_plain_without_color() {
        let printer = Printer::new(OutputFormat::Text, false);
        let line = printer
            .render(&Notification::FileChange(FileChange::new(
                "/src/main.rs",
                ChangeType::Modified,
            )))
            .unwrap();
        assert_eq!(line, "modified     /src/main.rs");

        let line = printer
            .render(&Notification::Disconnected {
                reason: DisconnectReason::Manual,
            })
            .unwrap();
        assert_eq!(line, "disconnected manual");
    }

    #[test]
    fn json_lines_carry_event_tag() {
        let printer = Printer::new(OutputFormat::Json, false);
        let line = printer
            .render(&Notification::ReconnectFailed { attempts: 10 })
            .unwrap();
        assert_eq!(line, r#"{"event":"reconnect_failed","attempts":10}"#);
    }

    #[test]
    fn color_wraps_tag_in_escape_codes() {
        let printer = Printer::new(OutputFormat::Text, true);
        let line = printer
            .render(&Notification::Error {
                detail: "boom".into(),
            })
            .unwrap();
        assert!(line.contains('\u{1b}'));
        assert!(line.ends_with("boom"));
    }
}
