//! Grounded answer synthesis.
//!
//! Combines retrieved passages, a window of recent conversation turns, and
//! the user query into a chat completion request, then enforces the
//! cite-or-refuse contract on the way out:
//!
//! - An empty retrieval set never reaches the model; it returns the fixed
//!   refusal immediately.
//! - A model response matching a configured insufficient-context pattern is
//!   replaced by the fixed refusal with `grounded = false`.
//! - `cited_document_ids` is derived from the passages actually placed in
//!   the prompt — the model cannot fabricate a citation.
//!
//! The model runs at low temperature; consistency beats creativity here.

use crate::config::LlmConfig;
use crate::error::EngineError;
use crate::llm::{ChatClient, ChatMessage};
use crate::models::{Answer, Role, Turn};
use crate::retrieve::ContextPassage;

/// The fixed refusal returned whenever the grounding guard fires.
pub const REFUSAL_TEXT: &str = "I could not find this information in the uploaded documents.";

/// Synthesize an answer from retrieved passages and recent history.
pub async fn synthesize(
    chat: &dyn ChatClient,
    llm: &LlmConfig,
    max_context_chars: usize,
    passages: &[ContextPassage],
    history: &[Turn],
    query: &str,
) -> Result<Answer, EngineError> {
    if passages.is_empty() {
        return Ok(refusal());
    }

    let included = select_within_budget(passages, max_context_chars);
    let system = build_system_prompt(&included);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    for turn in history {
        messages.push(match turn.role {
            Role::User => ChatMessage::user(turn.text.clone()),
            Role::Assistant => ChatMessage::assistant(turn.text.clone()),
        });
    }
    messages.push(ChatMessage::user(query.to_string()));

    let response = chat
        .complete(&messages, llm.temperature, llm.max_tokens)
        .await?;

    let lower = response.to_lowercase();
    if llm
        .refusal_patterns
        .iter()
        .any(|p| lower.contains(&p.to_lowercase()))
    {
        return Ok(refusal());
    }

    let mut cited_document_ids = Vec::new();
    let mut sources = Vec::new();
    for p in &included {
        if !cited_document_ids.contains(&p.document.id) {
            cited_document_ids.push(p.document.id.clone());
            sources.push(p.document.filename.clone());
        }
    }

    Ok(Answer {
        text: response,
        cited_document_ids,
        sources,
        grounded: true,
    })
}

fn refusal() -> Answer {
    Answer {
        text: REFUSAL_TEXT.to_string(),
        cited_document_ids: Vec::new(),
        sources: Vec::new(),
        grounded: false,
    }
}

/// Keep passages until the context budget is spent, truncating the one
/// that crosses it. At least one passage always survives.
fn select_within_budget(
    passages: &[ContextPassage],
    max_context_chars: usize,
) -> Vec<ContextPassage> {
    let mut included = Vec::new();
    let mut used = 0usize;

    for p in passages {
        let len = p.text.chars().count();
        if used + len <= max_context_chars {
            used += len;
            included.push(p.clone());
        } else {
            let remaining = max_context_chars.saturating_sub(used);
            if remaining > 0 || included.is_empty() {
                let mut truncated = p.clone();
                truncated.text = p.text.chars().take(remaining.max(1)).collect();
                included.push(truncated);
            }
            break;
        }
    }

    included
}

/// System instruction plus source-tagged context blocks.
fn build_system_prompt(passages: &[ContextPassage]) -> String {
    let mut prompt = String::from(
        "You are an assistant that answers questions using only the context \
         passages provided below.\n\
         Rules:\n\
         1. Answer only with information found in the passages.\n\
         2. If the passages do not contain the answer, reply exactly: \"",
    );
    prompt.push_str(REFUSAL_TEXT);
    prompt.push_str(
        "\"\n\
         3. Never reference documents that are not listed below.\n\
         4. Be concise.\n\n\
         Context passages:\n",
    );

    for (i, p) in passages.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] {} (chars {}-{})\n{}\n",
            i + 1,
            p.document.filename,
            p.char_start,
            p.char_end,
            p.text
        ));
    }

    prompt
}
