//! Line-oriented command parsing for the interactive driver.

use anyhow::{Result, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Send(String),
    Element { key: String, label: Option<String> },
    Block(String),
    ClearSelection,
    Option { id: String, label: String },
    Init { ad_id: String, account_id: String },
    Cancel,
    Reset,
    Status,
    Help,
    Quit,
}

pub(crate) const HELP: &str = "\
Commands:
  <text>                    send a message
  /element <key> [label]    select an element (headline, hook, cta...)
  /block <id>               toggle a content block in the selection
  /clear                    clear the selection
  /option <id> <label>      pick an offered option
  /init <ad_id> <account>   bind the session to an ad and draft a brief
  /cancel                   abort the reply in progress (also Ctrl-C)
  /reset                    start over with an empty conversation
  /status                   show session state
  /quit                     exit";

/// Parse one input line. Blank lines yield `None`.
pub(crate) fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };

    let (name, args) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, args)| (name, args.trim()));
    let mut words = args.split_whitespace();

    let command = match name {
        "element" => {
            let Some(key) = words.next() else {
                bail!("usage: /element <key> [label]");
            };
            let label = words.collect::<Vec<_>>().join(" ");
            Command::Element {
                key: key.to_string(),
                label: (!label.is_empty()).then_some(label),
            }
        }
        "block" => match words.next() {
            Some(id) => Command::Block(id.to_string()),
            None => bail!("usage: /block <id>"),
        },
        "clear" => Command::ClearSelection,
        "option" => {
            let Some(id) = words.next() else {
                bail!("usage: /option <id> <label>");
            };
            Command::Option {
                id: id.to_string(),
                label: words.collect::<Vec<_>>().join(" "),
            }
        }
        "init" => match (words.next(), words.next()) {
            (Some(ad_id), Some(account_id)) => Command::Init {
                ad_id: ad_id.to_string(),
                account_id: account_id.to_string(),
            },
            _ => bail!("usage: /init <ad_id> <account_id>"),
        },
        "cancel" => Command::Cancel,
        "reset" => Command::Reset,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command /{other} (try /help)"),
    };
    Ok(Some(command))
}
