//! Shell completion generation.

use std::io::Write;

use clap::CommandFactory;

use crate::cli::args::{Cli, CompletionsArgs, Shell};

impl From<Shell> for clap_complete::Shell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => Self::Bash,
            Shell::Zsh => Self::Zsh,
            Shell::Fish => Self::Fish,
            Shell::PowerShell => Self::PowerShell,
            Shell::Elvish => Self::Elvish,
        }
    }
}

fn generate(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_owned();
    clap_complete::generate(clap_complete::Shell::from(shell), &mut cmd, bin, out);
}

/// Print a completion script for `args.shell` to stdout.
pub fn run(args: &CompletionsArgs) {
    generate(args.shell, &mut std::io::stdout());
}
