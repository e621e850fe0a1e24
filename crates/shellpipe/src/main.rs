use anyhow::Result;
use clap::Parser;
use shellpipe_core::errors::ShellpipeError;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Propagate the child's own exit code when it exited non-zero
            if let Some(ShellpipeError::Shell(shell_error)) = err.downcast_ref::<ShellpipeError>()
            {
                if let Some(code) = shell_error.exit_code() {
                    eprintln!("Error: {}", shell_error);
                    std::process::exit(code);
                }
            }

            Err(err)
        }
    }
}
