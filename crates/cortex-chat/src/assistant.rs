use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{AgentBackend, AnalystBackend, Statement, StatementExecutor};
use crate::content::{AgentTurn, AnalystTurn, ResolvedCitation, normalize_citation_markers};
use crate::errors::CortexError;
use crate::events::SearchResultCitation;
use crate::model::{AnalystContent, AnalystRequest, Role};
use crate::reduce::{Reduction, reduce};
use crate::session::ChatSession;
use crate::vendors::snowflake::{AgentTools, CitationLookup, SnowflakeClient};

/// Per-question switches.
#[derive(Clone, Debug)]
pub struct TurnOptions {
    /// Run generated SQL and attach the result to the turn.
    pub execute_sql: bool,
    /// Look up the record behind each citation.
    pub resolve_citations: bool,
    /// Overrides the configured search `max_results` for this question.
    pub max_results: Option<u32>,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            execute_sql: true,
            resolve_citations: true,
            max_results: None,
        }
    }
}

impl TurnOptions {
    pub fn execute_sql(mut self, execute_sql: bool) -> Self {
        self.execute_sql = execute_sql;
        self
    }

    pub fn resolve_citations(mut self, resolve_citations: bool) -> Self {
        self.resolve_citations = resolve_citations;
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

struct AssistantInner {
    agent: Option<Arc<dyn AgentBackend>>,
    analyst: Option<Arc<dyn AnalystBackend>>,
    executor: Option<Arc<dyn StatementExecutor>>,
    tools: AgentTools,
    citations: CitationLookup,
}

/// Asks questions, reduces the replies and records them into a session.
#[derive(Clone)]
pub struct CortexAssistant {
    inner: Arc<AssistantInner>,
}

impl CortexAssistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }

    /// Wires one client in as agent, analyst and statement executor.
    pub fn from_client(
        client: SnowflakeClient,
        tools: AgentTools,
        citations: CitationLookup,
    ) -> Result<Self, CortexError> {
        let client = Arc::new(client);
        Self::builder()
            .agent(client.clone())
            .analyst(client.clone())
            .executor(client)
            .tools(tools)
            .citations(citations)
            .build()
    }

    pub fn tools(&self) -> &AgentTools {
        &self.inner.tools
    }

    pub fn executor(&self) -> Option<&dyn StatementExecutor> {
        self.inner.executor.as_deref()
    }

    /// Asks the agent one question.
    ///
    /// Transport failures abort the turn and leave `session` untouched. A
    /// failing SQL execution is reported in `AgentTurn::sql_result` instead.
    pub async fn ask(
        &self,
        session: &mut ChatSession,
        question: &str,
        options: &TurnOptions,
    ) -> Result<AgentTurn, CortexError> {
        let question = validate_question(question)?;
        let agent = self
            .inner
            .agent
            .as_ref()
            .ok_or_else(|| CortexError::Config("agent backend is not configured".into()))?;

        let mut tools = self.inner.tools.clone();
        if let Some(max_results) = options.max_results {
            tools.max_results = max_results;
        }
        let request = tools.request(question);
        debug!(session = %session.id(), "asking agent");

        let payload = agent.run_agent(&request).await?;
        Ok(self
            .complete_turn(session, question, reduce(&payload), options)
            .await)
    }

    /// Records an already reduced reply and runs the follow-up lookups.
    ///
    /// Used directly when the caller consumed the event stream itself.
    pub async fn complete_turn(
        &self,
        session: &mut ChatSession,
        question: &str,
        reduction: Reduction,
        options: &TurnOptions,
    ) -> AgentTurn {
        if !reduction.warnings.is_empty() {
            debug!(
                warnings = reduction.warnings.len(),
                "reply reduced with skipped units"
            );
        }
        let text = normalize_citation_markers(&reduction.text);

        session.push(Role::User, question, None);
        if !text.is_empty() {
            session.push(Role::Assistant, text.clone(), None);
        }

        let citations = match (&self.inner.executor, options.resolve_citations) {
            (Some(executor), true) => {
                self.resolve_citations(executor.as_ref(), &reduction.citations)
                    .await
            }
            _ => reduction
                .citations
                .iter()
                .map(|citation| ResolvedCitation {
                    citation: citation.clone(),
                    transcript: None,
                })
                .collect(),
        };

        let sql_result = match (&self.inner.executor, reduction.sql()) {
            (Some(executor), Some(sql)) if options.execute_sql => {
                let result = executor.execute(&Statement::new(sql)).await;
                if let Err(e) = &result {
                    warn!(error = %e, "generated SQL failed");
                }
                Some(result)
            }
            _ => None,
        };

        AgentTurn {
            reduction,
            text,
            citations,
            sql_result,
        }
    }

    /// Asks the analyst one question and stores its suggestions in the session.
    pub async fn ask_analyst(
        &self,
        session: &mut ChatSession,
        question: &str,
        options: &TurnOptions,
    ) -> Result<AnalystTurn, CortexError> {
        let question = validate_question(question)?;
        let analyst = self
            .inner
            .analyst
            .as_ref()
            .ok_or_else(|| CortexError::Config("analyst backend is not configured".into()))?;
        let semantic_model_file = self
            .inner
            .tools
            .semantic_model_file
            .as_deref()
            .ok_or_else(|| CortexError::Config("semantic model file is not configured".into()))?;

        let request = AnalystRequest::new(semantic_model_file, question);
        let response = analyst.send_analyst(&request).await?;

        let mut turn = AnalystTurn {
            request_id: response.request_id,
            content: response.message.content,
            sql_results: Vec::new(),
        };

        session.push(Role::User, question, None);
        let text = turn.text();
        if !text.is_empty() {
            session.push(Role::Analyst, text, turn.request_id.clone());
        }
        session.set_suggestions(turn.suggestions());

        if let (Some(executor), true) = (&self.inner.executor, options.execute_sql) {
            for part in &turn.content {
                if let AnalystContent::Sql { statement } = part {
                    let result = executor.execute(&Statement::new(statement.as_str())).await;
                    if let Err(e) = &result {
                        warn!(error = %e, "analyst SQL failed");
                    }
                    turn.sql_results.push((statement.clone(), result));
                }
            }
        }
        Ok(turn)
    }

    async fn resolve_citations(
        &self,
        executor: &dyn StatementExecutor,
        citations: &[SearchResultCitation],
    ) -> Vec<ResolvedCitation> {
        let mut cache: HashMap<String, Option<String>> = HashMap::new();
        let mut resolved = Vec::with_capacity(citations.len());
        for citation in citations {
            let transcript = match cache.get(&citation.doc_id) {
                Some(hit) => hit.clone(),
                None => {
                    let fetched = self.fetch_transcript(executor, &citation.doc_id).await;
                    cache.insert(citation.doc_id.clone(), fetched.clone());
                    fetched
                }
            };
            resolved.push(ResolvedCitation {
                citation: citation.clone(),
                transcript,
            });
        }
        resolved
    }

    async fn fetch_transcript(
        &self,
        executor: &dyn StatementExecutor,
        doc_id: &str,
    ) -> Option<String> {
        if doc_id.is_empty() {
            return None;
        }
        let statement = match self.inner.citations.statement(doc_id) {
            Ok(statement) => statement,
            Err(e) => {
                warn!(doc_id, error = %e, "citation lookup misconfigured");
                return None;
            }
        };
        match executor.execute(&statement).await {
            Ok(result) => result.first_cell().map(ToOwned::to_owned),
            Err(e) => {
                warn!(doc_id, error = %e, "citation lookup failed");
                None
            }
        }
    }
}

fn validate_question(question: &str) -> Result<&str, CortexError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(CortexError::Validation("question must not be empty".into()));
    }
    Ok(question)
}

/// Builder for `CortexAssistant`.
#[derive(Default)]
pub struct AssistantBuilder {
    agent: Option<Arc<dyn AgentBackend>>,
    analyst: Option<Arc<dyn AnalystBackend>>,
    executor: Option<Arc<dyn StatementExecutor>>,
    tools: AgentTools,
    citations: CitationLookup,
}

impl AssistantBuilder {
    pub fn agent(mut self, agent: Arc<dyn AgentBackend>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn analyst(mut self, analyst: Arc<dyn AnalystBackend>) -> Self {
        self.analyst = Some(analyst);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn StatementExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn tools(mut self, tools: AgentTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn citations(mut self, citations: CitationLookup) -> Self {
        self.citations = citations;
        self
    }

    /// Builds the assistant; at least one of agent or analyst is required.
    pub fn build(self) -> Result<CortexAssistant, CortexError> {
        if self.agent.is_none() && self.analyst.is_none() {
            return Err(CortexError::Config(
                "an agent or analyst backend is required".into(),
            ));
        }
        Ok(CortexAssistant {
            inner: Arc::new(AssistantInner {
                agent: self.agent,
                analyst: self.analyst,
                executor: self.executor,
                tools: self.tools,
                citations: self.citations,
            }),
        })
    }
}
