use cortex_chat::prelude::*;
use cortex_chat::vendors::snowflake::{AgentTools, SnowflakeClient};
use futures::StreamExt as _;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CortexError> {
    let client = SnowflakeClient::from_env()?;
    let request = AgentTools::from_env()?.request("Summarize the last three sales calls.");

    let mut events = client.stream_agent(&request).await?;
    let mut reducer = StreamReducer::new();
    let mut display = StreamingDisplay::new();
    while let Some(event) = events.next().await {
        let appended = reducer.push_event(&event?);
        if appended > 0 {
            let text = &reducer.snapshot().text;
            print!("{}", display.push(&text[text.len() - appended..]));
        }
    }
    println!("{}", display.finish());

    let reduction = reducer.finish();
    if let Some(sql) = reduction.sql() {
        println!("generated SQL: {sql}");
    }
    for citation in &reduction.citations {
        println!("[{}] {}", citation.source_id, citation.doc_id);
    }
    Ok(())
}
