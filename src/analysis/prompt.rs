//! Prompt construction for document analysis.

/// Instruction sent as the system message of every analysis call.
pub const SYSTEM_INSTRUCTION: &str =
    "You are a precise document analyzer. Provide specific, concrete analysis.";

/// Label of the topic line the model must answer with.
pub const TOPIC_LABEL: &str = "Topic:";

/// Label of the summary line the model must answer with.
pub const SUMMARY_LABEL: &str = "Summary:";

/// Build the user prompt for `content`. Deterministic; the content is
/// embedded verbatim.
pub fn build_prompt(content: &str) -> String {
    format!(
        "Please analyze the following text carefully and provide:\n\
         1. A specific, descriptive topic (1-3 words)\n\
         2. A comprehensive summary (3-4 sentences) that captures the main points, key arguments, or central themes.\n\
         \n\
         Text to analyze:\n\
         {content}\n\
         \n\
         Please ensure your response follows this exact format, on exactly two lines:\n\
         {TOPIC_LABEL} <concise topic>\n\
         {SUMMARY_LABEL} <detailed summary>\n"
    )
}
