//! Fixed pipeline instructions and user-facing strings
//!
//! Instructions that steer the pipeline are always English; the answer
//! language is forced by appending `Respond ONLY in <Language>.`

use super::language::Language;

/// Analyst system instruction
pub const ANALYST_SYSTEM: &str = "You are a world-class consultant. Your goal is to ASK QUESTIONS, \
     NOT ANSWER. Output ONLY 3-5 targeted clarifying questions. Do NOT provide the final solution yet.";

/// Master-prompt system instruction
pub const MASTER_SYSTEM: &str = "You are a Senior Prompt Engineer. Output ONLY the optimized MASTER \
     PROMPT based on the conversation. No introductions, no comments.";

/// Thinker system instruction; not language-forced
pub const THINKER_SYSTEM: &str = "You are a world-class AI expert and master problem solver.\n\
Your goal is to provide a highly accurate, professional, and comprehensive response.\n\
Analyze the request step-by-step, ensure technical depth, and deliver a masterpiece-level output.";

const ANALYST_TEMPLATE: &str = "You are a world-class expert consultant.\n\
Your goal is to help the user achieve the best possible result for their request.\n\
\n\
{request}\n\
\n\
PROCESS:\n\
1. Analyze the task or request above.\n\
2. Identify the missing information an expert would need to give a complete, detailed solution.\n\
3. Output ONLY 3-5 targeted clarifying questions, in the same language as the request.\n\
4. Focus on the CONTENT of the task (the \"what\" and the \"how\"), not on prompt optimization.\n\
\n\
CRITICAL INSTRUCTIONS:\n\
- DO NOT answer the request directly.\n\
- DO NOT provide solutions, recommendations, or lists.\n\
- Output ONLY the numbered questions, without introductions or conclusions.\n\
- Always respond in the SAME LANGUAGE as the request.";

/// Shown before reading the user's answers to the questions
pub const INTRO: &str =
    "For a better answer, please respond to the questions above (press Enter to confirm):";
/// Asked after each draft
pub const CONFIRM: &str = "Is this okay? (Y/N): ";
/// Asked when the draft is rejected
pub const MODIFY: &str = "What would you like to change?: ";
/// Shown when the user gives up on the draft
pub const CANCELLED: &str = "Operation cancelled.";

/// Append the language constraint to an instruction
#[must_use]
pub fn language_forced(instruction: &str, lang: Language) -> String {
    format!("{instruction} Respond ONLY in {}.", lang.name())
}

/// Analyst input with the original prompt inserted
#[must_use]
pub fn analyst_input(original: &str) -> String {
    ANALYST_TEMPLATE.replace("{request}", original)
}

/// Drafting input built from the original prompt and the accumulated context
#[must_use]
pub fn refinement_input(original: &str, context: &str, lang: Language) -> String {
    format!(
        "Original prompt: '{original}'\n{context}\n\nBased on the details, generate the optimized \
         MASTER PROMPT in {}. Output ONLY the prompt content.",
        lang.name()
    )
}

/// Context line carrying the answers to the analyst's questions
#[must_use]
pub fn details_line(details: &str) -> String {
    format!("User details: {details}")
}

/// Context line carrying a modification request
#[must_use]
pub fn feedback_line(feedback: &str) -> String {
    format!("\nUser feedback for modification: {feedback}")
}
