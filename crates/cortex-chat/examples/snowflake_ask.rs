use cortex_chat::prelude::*;
use cortex_chat::vendors::snowflake::{AgentTools, CitationLookup, SnowflakeClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CortexError> {
    let assistant = CortexAssistant::from_client(
        SnowflakeClient::from_env()?,
        AgentTools::from_env()?,
        CitationLookup::default(),
    )?;

    let mut session = ChatSession::new("example");
    let turn = assistant
        .ask(
            &mut session,
            "Which deals are most likely to close this quarter?",
            &TurnOptions::default().max_results(3),
        )
        .await?;

    println!("{}", turn.display_text());
    for resolved in &turn.citations {
        println!(
            "[{}] {}",
            resolved.citation.source_id,
            resolved.transcript_or_placeholder()
        );
    }
    if let Some(Ok(rows)) = &turn.sql_result {
        println!("{} row(s) from {:?}", rows.len(), turn.sql());
    }
    Ok(())
}
