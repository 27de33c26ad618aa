use std::io::Write;

use anyhow::{Context, Result};
use autoapp_core::BOOTSTRAP_APP;
use clap::CommandFactory;
use clap_complete::Shell;

use crate::Cli;

pub(crate) fn write_completions_script<W: Write>(shell: Shell, writer: &mut W) -> Result<()> {
    let mut command = Cli::command();
    let mut generated = Vec::new();
    clap_complete::generate(shell, &mut command, BOOTSTRAP_APP, &mut generated);
    writer
        .write_all(&generated)
        .context("failed writing generated completion script")
}
