//! Prompt templates for restoration, explanation, and feedback refinement.
//!
//! Every template embeds caller text verbatim between triple quotes. No
//! escaping is applied; a damaged text containing `"""` is passed through
//! unchanged.

use crate::models::Style;

/// Restoration prompt. `context` selects the RAG template.
pub fn restoration_prompt(damaged_text: &str, style: Style, context: Option<&str>) -> String {
    match context {
        Some(context) => rag_prompt(damaged_text, style, context),
        None => plain_prompt(damaged_text, style),
    }
}

fn plain_prompt(damaged_text: &str, style: Style) -> String {
    format!(
        "You are an expert document restoration assistant.\n\
         \n\
         Restore the following damaged or incomplete text in a {style} writing style:\n\
         \n\
         Damaged Text:\n\
         \"\"\"\n\
         {damaged_text}\n\
         \"\"\"\n\
         \n\
         Provide the most accurate and readable restoration.\n"
    )
}

fn rag_prompt(damaged_text: &str, style: Style, context: &str) -> String {
    format!(
        "You are an AI restoration expert trained in restoring {style} style texts.\n\
         \n\
         Use the context below to reconstruct the missing parts of the damaged text \
         as faithfully and factually as possible.\n\
         \n\
         Context:\n\
         \"\"\"\n\
         {context}\n\
         \"\"\"\n\
         \n\
         Damaged Text:\n\
         \"\"\"\n\
         {damaged_text}\n\
         \"\"\"\n\
         \n\
         Reconstruct the text while preserving its original meaning and tone.\n"
    )
}

/// Ask the model to justify `token` within an already restored text.
pub fn explanation_prompt(full_text: &str, token: &str) -> String {
    format!(
        "You're an explainable AI model for document restoration.\n\
         \n\
         The following text was restored from a damaged document:\n\
         \"\"\"{full_text}\"\"\"\n\
         \n\
         The user clicked on the word: **{token}**\n\
         \n\
         Explain **why** this word may have been chosen by the AI model. Consider:\n\
         - Writing style (e.g., academic, legal)\n\
         - Context around the word\n\
         - Relevance to the document's theme\n\
         \n\
         Keep the explanation concise but insightful.\n"
    )
}

/// Fold reader feedback into a follow-up request on a restoration.
pub fn feedback_prompt(restored_text: &str, feedback: &str) -> String {
    format!("Feedback: {feedback}\nText: {restored_text}")
}
