use std::io::Write;
use std::sync::Mutex;

use tracing::debug;

use crate::bridge::{PresentationBridge, RenderEvent};
use crate::conversation::Role;

pub struct TerminalBridge<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalBridge<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalBridge<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> Option<W> {
        self.out.into_inner().ok()
    }
}

pub fn format_event(event: &RenderEvent) -> String {
    match event {
        RenderEvent::SelectionChanged { selected } if selected.is_empty() => "[selected] (none)".to_string(),
        RenderEvent::SelectionChanged { selected } => {
            let lines: Vec<String> = selected
                .iter()
                .map(|p| format!("  #{} {} - {}", p.id, p.name, p.brand))
                .collect();
            format!("[selected]\n{}", lines.join("\n"))
        }
        RenderEvent::CatalogChanged { category, cards } if cards.is_empty() => {
            format!("[{}] no products in this category", category)
        }
        RenderEvent::CatalogChanged { category, cards } => {
            let lines: Vec<String> = cards
                .iter()
                .map(|c| {
                    let mark = if c.selected { "x" } else { " " };
                    format!("  [{}] #{} {} ({})", mark, c.product.id, c.product.name, c.product.brand)
                })
                .collect();
            format!("[{}]\n{}", category, lines.join("\n"))
        }
        RenderEvent::MessageAppended { message } => match message.role {
            Role::User => format!("you> {}", message.content),
            Role::Assistant => format!("assistant> {}", message.content),
            Role::System => format!("system> {}", message.content),
        },
        RenderEvent::Pending { label } => format!("... {}", label),
        RenderEvent::PendingCleared => String::new(),
        RenderEvent::Notice { notice } => format!("* {}", notice.text()),
        RenderEvent::ChatFailed { error } => format!("! {}", error),
    }
}

impl<W: Write + Send> PresentationBridge for TerminalBridge<W> {
    fn render(&self, event: RenderEvent) {
        let line = format_event(&event);
        if line.is_empty() {
            return;
        }
        if let Ok(mut out) = self.out.lock() {
            if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
                debug!(error = %e, "failed to write to terminal");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Category(String),
    Toggle(i64),
    Remove(i64),
    Clear,
    Routine,
    Help,
    Quit,
    Say(String),
    Invalid(String),
}

pub const HELP: &str = "commands: /category <name>, /toggle <id>, /remove <id>, /clear, /routine, \
/help, /quit; anything else is sent to the assistant";

pub fn parse_command(line: &str) -> ChatCommand {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return ChatCommand::Say(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (rest, ""),
    };
    let id = || arg.parse::<i64>().map_err(|_| format!("/{} needs a numeric product id", name));
    match name {
        "category" if !arg.is_empty() => ChatCommand::Category(arg.to_string()),
        "category" => ChatCommand::Invalid("/category needs a name".into()),
        "toggle" => id().map(ChatCommand::Toggle).unwrap_or_else(ChatCommand::Invalid),
        "remove" => id().map(ChatCommand::Remove).unwrap_or_else(ChatCommand::Invalid),
        "clear" => ChatCommand::Clear,
        "routine" => ChatCommand::Routine,
        "help" => ChatCommand::Help,
        "quit" | "exit" => ChatCommand::Quit,
        other => ChatCommand::Invalid(format!("unknown command /{}", other)),
    }
}
