//! Terminal chat loop.

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::agent::Agent;
use crate::ui;

const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "bye"];

fn is_exit_command(input: &str) -> bool {
    EXIT_COMMANDS
        .iter()
        .any(|cmd| input.trim().eq_ignore_ascii_case(cmd))
}

/// Read user lines until an exit command, end of input or Ctrl-C. All turns
/// share one thread.
pub async fn run(agent: Arc<Agent>) -> anyhow::Result<()> {
    let thread_id = Uuid::new_v4();
    tracing::info!(thread = %thread_id, "Terminal session started");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            ui::print_goodbye();
            return Ok(());
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit_command(input) {
            ui::print_goodbye();
            return Ok(());
        }

        tokio::select! {
            _ = run_turn(&agent, thread_id, input.to_string()) => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                ui::print_goodbye();
                return Ok(());
            }
        }
    }
}

async fn run_turn(agent: &Arc<Agent>, thread_id: Uuid, input: String) {
    let steps = Arc::clone(agent).stream(thread_id, input);
    futures::pin_mut!(steps);

    while let Some(step) = steps.next().await {
        match step {
            Ok(step) => {
                ui::print_rule("Current State");
                for msg in step.new_messages() {
                    ui::print_message(msg);
                }
            }
            Err(e) => {
                tracing::warn!(thread = %thread_id, error = %e, "Turn failed");
                ui::print_error(&e.to_string());
            }
        }
    }
}
