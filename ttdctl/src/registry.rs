//! Operator command table.
//!
//! Built once at startup and handed to the dispatch loop; nothing registers
//! itself globally.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::debug;

use crate::controller::Controller;

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    pub controller: &'a Controller,
    pub registry: &'a CommandRegistry,
    /// Operator-facing output.
    pub out: &'a mut dyn Write,
}

pub type CommandHandler = fn(&mut CommandContext<'_>, &str) -> Result<()>;

/// One registered command.
#[derive(Debug, Clone, Copy)]
pub struct CommandEntry {
    pub names: &'static [&'static str],
    pub handler: CommandHandler,
    pub help: &'static str,
}

/// Ordered command table.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard operator commands: help, quit, save, exec.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(CommandEntry {
            names: &["help", "h"],
            handler: help_command,
            help: "Print help text.",
        });
        registry.register(CommandEntry {
            names: &["quit", "q"],
            handler: quit_command,
            help: "Terminate server.",
        });
        registry.register(CommandEntry {
            names: &["save", "s"],
            handler: save_command,
            help: "Save current game state.",
        });
        registry.register(CommandEntry {
            names: &["exec", "x"],
            handler: exec_command,
            help: "Send a console command to the server.",
        });
        registry
    }

    pub fn register(&mut self, entry: CommandEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Find the entry for `name`.
    ///
    /// When several entries share an alias, the last registered one wins.
    pub fn lookup(&self, name: &str) -> Option<&CommandEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.names.contains(&name))
    }
}

fn help_command(ctx: &mut CommandContext<'_>, _args: &str) -> Result<()> {
    for entry in ctx.registry.entries() {
        writeln!(ctx.out, "{:<10} {}", entry.names.join(", "), entry.help)
            .context("write help")?;
    }
    Ok(())
}

fn quit_command(ctx: &mut CommandContext<'_>, _args: &str) -> Result<()> {
    ctx.controller.quit("quit command")?;
    Ok(())
}

fn save_command(ctx: &mut CommandContext<'_>, _args: &str) -> Result<()> {
    if let Some(path) = ctx.controller.save()? {
        writeln!(ctx.out, "Saved {}", path.display()).context("write save notice")?;
    }
    Ok(())
}

fn exec_command(ctx: &mut CommandContext<'_>, args: &str) -> Result<()> {
    debug!(command = args, "forwarding raw command");
    ctx.controller.server().send_command(args)
}
