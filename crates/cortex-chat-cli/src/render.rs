use std::io::{self, Write};

use cortex_chat::content::display_text;
use cortex_chat::vendors::snowflake::ColumnDefinition;
use cortex_chat::{AgentTurn, AnalystTurn, CortexError, QueryResult, Reduction};

/// Cells wider than this are cut in table output.
const MAX_CELL_WIDTH: usize = 40;

pub fn agent_turn(out: &mut impl Write, turn: &AgentTurn) -> io::Result<()> {
    let text = turn.display_text();
    if text.is_empty() {
        writeln!(out, "(no answer)")?;
    } else {
        writeln!(out, "{text}")?;
    }
    agent_turn_details(out, turn)
}

/// Everything after the answer text; used when the text was streamed already.
pub fn agent_turn_details(out: &mut impl Write, turn: &AgentTurn) -> io::Result<()> {
    if !turn.citations.is_empty() {
        writeln!(out, "\nCitations:")?;
        for resolved in &turn.citations {
            writeln!(
                out,
                "  [{}] {}",
                resolved.citation.source_id, resolved.citation.doc_id
            )?;
            writeln!(out, "      {}", resolved.transcript_or_placeholder())?;
        }
    }

    if let Some(sql) = turn.sql() {
        writeln!(out, "\nSQL:\n{sql}")?;
        if let Some(result) = &turn.sql_result {
            query_outcome(out, result)?;
        }
    }
    warnings(out, &turn.reduction)
}

pub fn analyst_turn(out: &mut impl Write, turn: &AnalystTurn) -> io::Result<()> {
    let text = turn.text();
    if !text.is_empty() {
        writeln!(out, "{text}")?;
    }
    for (sql, result) in &turn.sql_results {
        writeln!(out, "\nSQL:\n{sql}")?;
        query_outcome(out, result)?;
    }
    let suggestions = turn.suggestions();
    if !suggestions.is_empty() {
        writeln!(out, "\nSuggestions:")?;
        for (i, suggestion) in suggestions.iter().enumerate() {
            writeln!(out, "  {}. {suggestion}", i + 1)?;
        }
    }
    if let Some(id) = &turn.request_id {
        writeln!(out, "\n(request {id})")?;
    }
    Ok(())
}

/// Plain-text view of an offline reduction.
pub fn reduction(out: &mut impl Write, reduction: &Reduction) -> io::Result<()> {
    writeln!(out, "{}", display_text(&reduction.text))?;
    if let Some(sql) = reduction.sql() {
        writeln!(out, "\nSQL:\n{sql}")?;
    }
    if !reduction.citations.is_empty() {
        writeln!(out, "\nCitations:")?;
        for citation in &reduction.citations {
            writeln!(out, "  [{}] {}", citation.source_id, citation.doc_id)?;
        }
    }
    warnings(out, reduction)
}

pub fn columns(out: &mut impl Write, columns: &[ColumnDefinition]) -> io::Result<()> {
    let table = QueryResult {
        columns: vec!["NAME".into(), "TYPE".into(), "LENGTH".into()],
        rows: columns
            .iter()
            .map(|c| {
                vec![
                    Some(c.name.clone()),
                    Some(c.base_type.clone()),
                    Some(c.length.clone()),
                ]
            })
            .collect(),
    };
    query_result(out, &table)
}

fn query_outcome(
    out: &mut impl Write,
    result: &Result<QueryResult, CortexError>,
) -> io::Result<()> {
    match result {
        Ok(result) => query_result(out, result),
        Err(e) => writeln!(out, "query failed: {e}"),
    }
}

pub fn query_result(out: &mut impl Write, result: &QueryResult) -> io::Result<()> {
    if result.is_empty() {
        return writeln!(out, "(no rows)");
    }
    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|c| clip(c.as_deref().unwrap_or("NULL"))).collect())
        .collect();
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            let width = cell.chars().count();
            match widths.get_mut(i) {
                Some(w) => *w = (*w).max(width),
                None => widths.push(width),
            }
        }
    }

    let header: Vec<&str> = result.columns.iter().map(String::as_str).collect();
    line(out, &header, &widths)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    line(out, &rule, &widths)?;
    for row in &cells {
        line(out, row, &widths)?;
    }
    writeln!(out, "({} row{})", result.len(), if result.len() == 1 { "" } else { "s" })
}

fn line(out: &mut impl Write, cells: &[impl AsRef<str>], widths: &[usize]) -> io::Result<()> {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect();
    writeln!(out, "{}", padded.join("  ").trim_end())
}

fn clip(cell: &str) -> String {
    let flat = cell.replace('\n', " ");
    if flat.chars().count() <= MAX_CELL_WIDTH {
        return flat;
    }
    let mut clipped: String = flat.chars().take(MAX_CELL_WIDTH - 1).collect();
    clipped.push('…');
    clipped
}

fn warnings(out: &mut impl Write, reduction: &Reduction) -> io::Result<()> {
    if reduction.warnings.is_empty() {
        return Ok(());
    }
    writeln!(out, "\n{} part(s) of the reply were skipped:", reduction.warnings.len())?;
    for warning in &reduction.warnings {
        writeln!(out, "  {warning}")?;
    }
    Ok(())
}
