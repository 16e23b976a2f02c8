use std::path::Path;

use anyhow::{Context as _, Result};
use cortex_chat::vendors::snowflake::{AgentTools, CitationLookup, SnowflakeConfig};

/// Loads `.env` from the crate directory and then from the working directory.
///
/// Variables already set in the process environment win.
pub fn init() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

/// Everything the commands need to talk to the service.
pub struct Settings {
    pub connection: SnowflakeConfig,
    pub tools: AgentTools,
    pub citations: CitationLookup,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let connection = SnowflakeConfig::from_lookup(&lookup)
            .context("connection settings are incomplete")?;
        let tools = AgentTools::from_lookup(&lookup).context("invalid agent tool settings")?;
        let citations = CitationLookup::from_lookup(&lookup);
        Ok(Self {
            connection,
            tools,
            citations,
        })
    }
}
