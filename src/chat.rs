//! `shopdesk ask` and `shopdesk chat`: conversational turns from the terminal.

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::Config;
use crate::orchestrator::{Orchestrator, Session};
use crate::reasoning::create_engine;
use crate::runtime::Runtime;

async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    if !config.reasoning.is_enabled() {
        bail!(
            "Reasoning provider is disabled. Set [reasoning] provider = \"openai\" and a model in the config."
        );
    }
    let runtime = Runtime::load(config).await?;
    let engine = create_engine(&config.reasoning)?;
    Ok(runtime.orchestrator(engine, config))
}

/// Answer a single question in a fresh session.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let mut session = Session::new("cli", config.conversation.history_window);
    let outcome = orchestrator.handle_question(&mut session, question).await;
    println!("{}", outcome.answer);
    if !outcome.success {
        bail!("turn did not complete");
    }
    Ok(())
}

/// Read questions from stdin until EOF or `exit`, keeping one session.
pub async fn run_chat(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let mut session = Session::new("cli", config.conversation.history_window);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("Shopdesk chat. Type `exit` to quit.");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }
        let outcome = orchestrator.handle_question(&mut session, question).await;
        println!("{}\n", outcome.answer);
    }
    Ok(())
}
