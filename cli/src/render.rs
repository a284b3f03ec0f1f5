//! Incremental plain-text rendering of the latest AI reply.

use std::io::{self, Write};

use canvas_engine::{MessageId, Role, SessionController, ToolStatus};

#[derive(Debug, Default)]
pub(crate) struct ReplyPrinter {
    current: Option<MessageId>,
    printed: usize,
    tools: Vec<(String, ToolStatus)>,
    finished: bool,
}

impl ReplyPrinter {
    /// Write whatever the latest AI message gained since the last call.
    pub(crate) fn render(&mut self, session: &SessionController, out: &mut impl Write) -> io::Result<()> {
        let Some(message) = session.messages().iter().rev().find(|m| m.role() == Role::Ai) else {
            return Ok(());
        };

        if self.current != Some(message.id()) {
            *self = Self {
                current: Some(message.id()),
                ..Self::default()
            };
            write!(out, "\nai> ")?;
        }
        if self.finished {
            return Ok(());
        }

        for call in message.tool_calls().iter() {
            let seen = self
                .tools
                .iter_mut()
                .find(|(id, _)| id == call.id());
            match seen {
                Some((_, status)) if *status == call.status() => continue,
                Some((_, status)) => *status = call.status(),
                None => self.tools.push((call.id().to_string(), call.status())),
            }
            let note = call.message().map(|m| format!(" ({m})")).unwrap_or_default();
            write!(out, "\n  [{}] {}{note}\n", call.status().as_str(), call.tool())?;
        }

        let content = message.content();
        if content.len() > self.printed {
            write!(out, "{}", &content[self.printed..])?;
            self.printed = content.len();
        }

        if !message.is_streaming() {
            self.finished = true;
            writeln!(out)?;
            for suggestion in message.follow_up_suggestions() {
                writeln!(out, "  > {suggestion}")?;
            }
            if let Some(options) = session.element_options()
                && !options.is_resolved()
            {
                writeln!(out, "  options for {}:", options.element)?;
                for option in &options.options {
                    writeln!(out, "    {} - {}", option.id, option.label)?;
                }
            }
        }
        out.flush()
    }
}
