//! `cortex-chat` command-line front end.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cortex_chat::vendors::snowflake::{SnowflakeClient, describe_view};
use cortex_chat::{
    ChatSession, CortexAssistant, CortexError, Reduction, StreamReducer, StreamingDisplay,
    TurnOptions, parse_agent_body, reduce,
};
use futures::{Stream, StreamExt as _};
use serde_json::Value;

mod config;
mod observability;
mod render;
mod repl;

/// Ask Cortex agents and analysts questions from the terminal.
#[derive(Parser)]
#[command(name = "cortex-chat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log request details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the agent one question
    Ask(AskArgs),
    /// Ask the analyst (text-to-SQL) one question
    Analyst(AnalystArgs),
    /// Interactive chat
    Chat(ChatArgs),
    /// Reduce a saved agent response body offline
    Reduce(ReduceArgs),
    /// List the columns of a view
    DescribeView(DescribeViewArgs),
}

#[derive(Args)]
struct AskArgs {
    question: String,
    /// Search results to retrieve per question
    #[arg(long, value_name = "N")]
    max_results: Option<u32>,
    /// Do not run the generated SQL
    #[arg(long)]
    no_execute: bool,
    /// Do not look up cited records
    #[arg(long)]
    no_citations: bool,
    /// Print the answer while it is generated
    #[arg(long)]
    stream: bool,
}

impl AskArgs {
    fn options(&self) -> TurnOptions {
        let mut options = TurnOptions::default()
            .execute_sql(!self.no_execute)
            .resolve_citations(!self.no_citations);
        options.max_results = self.max_results;
        options
    }
}

#[derive(Args)]
struct AnalystArgs {
    question: String,
    /// Do not run the generated SQL
    #[arg(long)]
    no_execute: bool,
}

#[derive(Args)]
struct ChatArgs {
    #[arg(long, value_enum, default_value_t = Mode::Agent)]
    mode: Mode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Mode {
    Agent,
    Analyst,
}

#[derive(Args)]
struct ReduceArgs {
    /// File holding a JSON event array or a raw SSE body
    file: PathBuf,
    /// Print the reduction as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DescribeViewArgs {
    /// View name, optionally qualified as `db.schema.view`
    name: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    config::init();
    let cli = Cli::parse();
    observability::init_observability(cli.verbose);

    match cli.command {
        Commands::Reduce(args) => reduce_file(&args),
        Commands::Ask(args) => ask(&args).await,
        Commands::Analyst(args) => analyst(&args).await,
        Commands::Chat(args) => {
            let (_, assistant) = connect()?;
            repl::Repl::new(assistant, args.mode)?.run().await
        }
        Commands::DescribeView(args) => {
            let (client, _) = connect()?;
            let columns = describe_view(&client, &args.name)
                .await
                .with_context(|| format!("failed to describe view {}", args.name))?;
            render::columns(&mut std::io::stdout().lock(), &columns)?;
            Ok(())
        }
    }
}

fn connect() -> Result<(SnowflakeClient, CortexAssistant)> {
    let settings = config::Settings::from_env()?;
    let client = SnowflakeClient::new(settings.connection).context("failed to create client")?;
    let assistant =
        CortexAssistant::from_client(client.clone(), settings.tools, settings.citations)?;
    Ok((client, assistant))
}

fn reduce_file(args: &ReduceArgs) -> Result<()> {
    let body = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let payload = parse_agent_body(&body, None)
        .with_context(|| format!("failed to parse {}", args.file.display()))?;
    let reduction = reduce(&payload);

    let mut out = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &reduction)?;
        writeln!(out)?;
    } else {
        render::reduction(&mut out, &reduction)?;
    }
    Ok(())
}

async fn ask(args: &AskArgs) -> Result<()> {
    let (client, assistant) = connect()?;
    let mut session = ChatSession::new("cli");
    let options = args.options();
    let mut out = std::io::stdout();

    if !args.stream {
        let turn = assistant
            .ask(&mut session, &args.question, &options)
            .await
            .context("agent request failed")?;
        render::agent_turn(&mut out.lock(), &turn)?;
        return Ok(());
    }

    let mut tools = assistant.tools().clone();
    if let Some(max_results) = options.max_results {
        tools.max_results = max_results;
    }
    let events = client
        .stream_agent(&tools.request(&args.question))
        .await
        .context("agent request failed")?;
    let reduction = stream_answer(events, &mut out).await?;

    let turn = assistant
        .complete_turn(&mut session, &args.question, reduction, &options)
        .await;
    render::agent_turn_details(&mut out.lock(), &turn)?;
    Ok(())
}

/// Printed after streamed text when the rest of the reply could not be read.
const INCOMPLETE_NOTICE: &str = "[reply interrupted: the text above is incomplete and not valid]";

/// Prints the answer text as events arrive and returns the reduced reply.
async fn stream_answer<S>(mut events: S, out: &mut impl Write) -> Result<Reduction>
where
    S: Stream<Item = Result<Value, CortexError>> + Unpin,
{
    let mut reducer = StreamReducer::new();
    let mut display = StreamingDisplay::new();
    let mut printed = false;
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                if printed {
                    writeln!(out, "\n{INCOMPLETE_NOTICE}")?;
                }
                return Err(e).context("agent stream failed");
            }
        };
        let appended = reducer.push_event(&event);
        if appended > 0 {
            let text = &reducer.snapshot().text;
            write!(out, "{}", display.push(&text[text.len() - appended..]))?;
            out.flush()?;
            printed = true;
        }
    }
    writeln!(out, "{}", display.finish())?;
    Ok(reducer.finish())
}

async fn analyst(args: &AnalystArgs) -> Result<()> {
    let (_, assistant) = connect()?;
    let mut session = ChatSession::new("cli");
    let options = TurnOptions::default().execute_sql(!args.no_execute);
    let turn = assistant
        .ask_analyst(&mut session, &args.question, &options)
        .await
        .context("analyst request failed")?;
    render::analyst_turn(&mut std::io::stdout().lock(), &turn)?;
    Ok(())
}
