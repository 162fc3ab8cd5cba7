use std::fmt;

const PREAMBLE: &str = concat!(
    "You are an expert AI assistant specialized in analyzing images and extracting information. ",
    "Please analyze the provided image carefully and answer the user's question accurately. ",
    "If the image contains text (like documents, receipts, signs, etc.), ",
    "extract and read it precisely. ",
    "If the image contains objects, describe them in detail. ",
    "If you cannot find relevant information for the user's question, ",
    "clearly state what you can observe instead. ",
    "Be comprehensive but concise in your response."
);

/// The instruction text sent to the generation service for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPrompt(String);

impl InstructionPrompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for InstructionPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wraps the user's question in the fixed preamble. The question is kept
/// verbatim.
pub fn build_instructions(question: &str) -> InstructionPrompt {
    InstructionPrompt(format!("{PREAMBLE}\n\nUser Question: {question}"))
}
