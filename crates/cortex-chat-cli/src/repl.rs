//! Interactive chat loop.

use anyhow::Result;
use cortex_chat::{ChatSession, CortexAssistant, TurnOptions};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use crate::Mode;
use crate::render;

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Ask(&'a str),
    Reset,
    Suggest(usize),
    History,
    Mode(Mode),
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(line);
    };
    let mut parts = rest.split_whitespace();
    match (parts.next().unwrap_or_default(), parts.next()) {
        ("reset", None) => Command::Reset,
        ("history", None) => Command::History,
        ("help", None) => Command::Help,
        ("quit" | "exit", None) => Command::Quit,
        ("mode", Some("agent")) => Command::Mode(Mode::Agent),
        ("mode", Some("analyst")) => Command::Mode(Mode::Analyst),
        // Suggestions are shown 1-based.
        ("suggest", Some(n)) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Command::Suggest(n - 1),
            _ => Command::Unknown(line),
        },
        _ => Command::Unknown(line),
    }
}

pub struct Repl {
    assistant: CortexAssistant,
    session: ChatSession,
    editor: Editor<(), DefaultHistory>,
    mode: Mode,
    options: TurnOptions,
}

impl Repl {
    pub fn new(assistant: CortexAssistant, mode: Mode) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();
        let editor = Editor::with_config(config)?;
        Ok(Self {
            assistant,
            session: ChatSession::new("repl"),
            editor,
            mode,
            options: TurnOptions::default(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("cortex-chat ({:?} mode). Type /help for commands.", self.mode);

        loop {
            let prompt = match self.mode {
                Mode::Agent => "agent> ",
                Mode::Analyst => "analyst> ",
            };
            let line = match self.editor.readline(prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("(interrupted, type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_command(line) {
                Command::Ask(question) => self.ask(question).await,
                Command::Reset => {
                    self.session.reset();
                    println!("(history cleared)");
                }
                Command::Suggest(index) => {
                    if self.session.select_suggestion(index).is_none() {
                        println!("(no suggestion {})", index + 1);
                        continue;
                    }
                    if let Some(question) = self.session.take_active_suggestion() {
                        println!("> {question}");
                        self.ask(&question).await;
                    }
                }
                Command::History => self.print_history(),
                Command::Mode(mode) => {
                    self.mode = mode;
                    println!("(switched to {mode:?} mode)");
                }
                Command::Help => print_help(),
                Command::Quit => break,
                Command::Unknown(input) => println!("unknown command: {input} (try /help)"),
            }
        }
        Ok(())
    }

    async fn ask(&mut self, question: &str) {
        let rendered = match self.mode {
            Mode::Agent => self
                .assistant
                .ask(&mut self.session, question, &self.options)
                .await
                .map(|turn| render::agent_turn(&mut std::io::stdout().lock(), &turn)),
            Mode::Analyst => self
                .assistant
                .ask_analyst(&mut self.session, question, &self.options)
                .await
                .map(|turn| render::analyst_turn(&mut std::io::stdout().lock(), &turn)),
        };
        match rendered {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("error: failed to print reply: {e}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    fn print_history(&self) {
        if self.session.is_empty() {
            println!("(no messages)");
            return;
        }
        for message in self.session.messages() {
            println!(
                "[{}] {}: {}",
                message.created_at.format("%H:%M:%S"),
                message.role.as_str(),
                cortex_chat::display_text(&message.content)
            );
        }
    }
}

fn print_help() {
    println!("/reset          clear the conversation");
    println!("/suggest <n>    ask the n-th suggested question");
    println!("/history        show the conversation");
    println!("/mode <m>       switch between agent and analyst");
    println!("/quit           leave");
}
