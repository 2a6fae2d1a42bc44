use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use sciqa_answer::Synthesizer;
use sciqa_chat::{ChatRequest, ChatService, MemorySessionStore, Orchestrator};

use crate::Services;

/// Read questions from stdin, one per line, within a single session.
pub async fn run(services: Services) -> Result<()> {
    let synthesizer = Arc::new(Synthesizer::from_settings(&services.settings)?);
    let orchestrator = Orchestrator::with_model(synthesizer.llm(), Arc::new(services.retriever()), synthesizer)
        .with_history_window(services.settings.session.history_window);
    let sessions = Arc::new(MemorySessionStore::from_settings(&services.settings.session));
    let service = ChatService::new(Arc::new(orchestrator), sessions);

    let mut session_id = None;
    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let message = line?;
        if message.trim().is_empty() {
            print!("> ");
            io::stdout().flush()?;
            continue;
        }
        let response = service
            .handle(ChatRequest { message, session_id: session_id.clone(), ..Default::default() })
            .await?;
        session_id = Some(response.session_id);
        println!("\n{}\n", response.message);
        if let Some(result) = &response.rag_response {
            for (i, c) in result.citations.iter().enumerate() {
                println!("[{}] {}", i + 1, c.url);
            }
        }
        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}
