use parley_llm::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const TITLE_GENERATION_PROMPT: &str = "title_generation";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("Prompt '{0}' is not registered")]
    UnknownPrompt(String),

    #[error("Prompt '{prompt}' has no value for placeholder '{placeholder}'")]
    MissingVariable { prompt: String, placeholder: String },

    #[error("Prompt '{0}' has an unterminated placeholder")]
    Malformed(String),
}

/// A named system prompt plus a user-turn template with `{{placeholder}}` slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub description: String,
    pub version: String,
    pub system_prompt: String,
    pub user_template: String,
}

/// Registry of prompts by name
#[derive(Debug, Clone)]
pub struct PromptManager {
    prompts: HashMap<String, PromptTemplate>,
}

impl Default for PromptManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptManager {
    /// Manager with the built-in prompts registered
    pub fn new() -> Self {
        let mut manager = Self {
            prompts: HashMap::new(),
        };
        manager.register(title_generation_prompt());
        manager
    }

    pub fn register(&mut self, prompt: PromptTemplate) {
        self.prompts.insert(prompt.name.clone(), prompt);
    }

    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.prompts.get(name)
    }

    /// Render `name` into a system turn and a user turn.
    ///
    /// Values are inserted verbatim, so braces inside user content are never
    /// read as placeholders.
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<Vec<ChatMessage>, PromptError> {
        let prompt = self
            .get(name)
            .ok_or_else(|| PromptError::UnknownPrompt(name.to_string()))?;

        let user = fill(&prompt.name, &prompt.user_template, vars)?;
        let system = fill(&prompt.name, &prompt.system_prompt, vars)?;

        Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }
}

fn fill(prompt: &str, template: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| PromptError::Malformed(prompt.to_string()))?;
        let key = after[..end].trim();

        let value = vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| PromptError::MissingVariable {
                prompt: prompt.to_string(),
                placeholder: key.to_string(),
            })?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn title_generation_prompt() -> PromptTemplate {
    PromptTemplate {
        name: TITLE_GENERATION_PROMPT.to_string(),
        description: "Generates concise, descriptive titles for conversations based on the first message exchange"
            .to_string(),
        version: "1.0".to_string(),
        system_prompt: r#"You are a helpful assistant that generates concise, descriptive titles for conversations.
Your task is to create a title that captures the main topic or question from the conversation.

Guidelines:
- Maximum 50 characters
- Be specific and descriptive
- Use title case (capitalize major words)
- No quotes or special formatting
- Focus on the main topic or question
- Avoid generic phrases like "Help with" or "Question about"

Examples of good titles:
- "Python Data Analysis Optimization"
- "React Component Architecture"
- "SQL Query Performance Issues"
- "Machine Learning Model Selection"
- "Docker Container Configuration"
- "API Authentication Best Practices"
- "JavaScript Async/Await Patterns"
- "Database Schema Design"

Examples of bad titles:
- "Help with Python" (too vague)
- "Question about React" (too generic)
- "I need assistance with..." (too long/wordy)
- "Can you help me..." (focuses on request, not topic)"#
            .to_string(),
        user_template: "Based on this conversation, generate a concise title (maximum 50 characters):\n\n\
User: {{user_message}}\n\
Assistant: {{assistant_message}}\n\n\
Generate only the title, no additional text or formatting:"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_llm::Role;

    #[test]
    fn test_render_title_prompt() {
        let manager = PromptManager::new();
        let messages = manager
            .render(
                TITLE_GENERATION_PROMPT,
                &[("user_message", "How do I sort a dict?"), ("assistant_message", "Use sorted().")],
            )
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Maximum 50 characters"));
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("User: How do I sort a dict?\nAssistant: Use sorted()."));
        assert!(!messages[1].content.contains("{{"));
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let manager = PromptManager::new();
        let messages = manager
            .render(
                TITLE_GENERATION_PROMPT,
                &[("user_message", "what does {{assistant_message}} mean"), ("assistant_message", "x")],
            )
            .unwrap();
        assert!(messages[1].content.contains("what does {{assistant_message}} mean"));
    }

    #[test]
    fn test_missing_variable_and_unknown_prompt() {
        let manager = PromptManager::new();
        assert_eq!(
            manager.render(TITLE_GENERATION_PROMPT, &[("user_message", "hi")]),
            Err(PromptError::MissingVariable {
                prompt: TITLE_GENERATION_PROMPT.to_string(),
                placeholder: "assistant_message".to_string(),
            })
        );
        assert_eq!(
            manager.render("summarize", &[]),
            Err(PromptError::UnknownPrompt("summarize".to_string()))
        );
    }

    #[test]
    fn test_custom_prompt_registration() {
        let mut manager = PromptManager::new();
        manager.register(PromptTemplate {
            name: "greet".to_string(),
            description: String::new(),
            version: "1".to_string(),
            system_prompt: "Be kind".to_string(),
            user_template: "Say hi to {{ name }}".to_string(),
        });
        let messages = manager.render("greet", &[("name", "Ana")]).unwrap();
        assert_eq!(messages[1].content, "Say hi to Ana");

        manager.register(PromptTemplate {
            name: "broken".to_string(),
            description: String::new(),
            version: "1".to_string(),
            system_prompt: String::new(),
            user_template: "Hi {{name".to_string(),
        });
        assert_eq!(
            manager.render("broken", &[("name", "x")]),
            Err(PromptError::Malformed("broken".to_string()))
        );
    }
}
