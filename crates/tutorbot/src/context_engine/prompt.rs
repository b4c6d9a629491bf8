
//! Prompt assembly: persona system prompt, rendered context sections, and
//! the final prompt sent to the completion service.
use crate::context_engine::composer::{ContextBundle, ContextStrategy};
use crate::memory_db::Conversation;
use crate::utils::TextUtils;

const PREVIEW_CHARS: usize = 150;

pub fn system_prompt(conversation: &Conversation) -> String {
    format!(
        "You are a tutor named {}, acting as {}. Help the user with their questions. \
         Use markdown formatting for your output.",
        conversation.bot_name, conversation.persona
    )
}

/// Render the bundle into labeled sections. Empty bundles render to an
/// empty string, which selects the no-context prompt shape.
pub fn render_context(bundle: &ContextBundle) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(ref summary) = bundle.summary {
        parts.push("**Conversation Summary:**".to_string());
        parts.push(format!("\u{2022} {}", summary));
        parts.push(String::new());
    }

    if !bundle.snippets.is_empty() {
        parts.push("**Relevant Context:**".to_string());
        for snippet in &bundle.snippets {
            parts.push(format!(
                "\u{2022} {}",
                TextUtils::truncate_with_ellipsis(&snippet.text, PREVIEW_CHARS)
            ));
        }
        parts.push(String::new());
    }

    if !bundle.recent_messages.is_empty() {
        let heading = match bundle.strategy {
            ContextStrategy::Hybrid => "**Recent Questions:**",
            _ => "**Recent Context:**",
        };
        parts.push(heading.to_string());
        for message in &bundle.recent_messages {
            let speaker = if message.role == "user" { "User" } else { "Assistant" };
            parts.push(format!(
                "\u{2022} {}: {}",
                speaker,
                TextUtils::truncate_with_ellipsis(&message.content, PREVIEW_CHARS)
            ));
        }
        parts.push(String::new());
    }

    parts.join("\n")
}

pub fn build_prompt(system_prompt: &str, context: &str, user_query: &str) -> String {
    if context.trim().is_empty() {
        return format!("{}\n\nUser: {}\n\nAssistant:", system_prompt, user_query);
    }

    format!(
        "{system}\n\n{context}\n**Current Question:** {query}\n\n\
         **Instructions:**\n\
         1. Use ONLY the relevant context above to answer the current question\n\
         2. If the context directly answers the question, reference it specifically\n\
         3. If the context is not relevant to the current question, ignore it and answer directly\n\
         4. Do not make up information that's not in the context\n\
         5. Build on previous explanations without repeating them unnecessarily\n\n\
         Please provide a helpful response based on the context:",
        system = system_prompt,
        context = context,
        query = user_query,
    )
}
