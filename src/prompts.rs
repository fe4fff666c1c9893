//! Prompt templates with named placeholders
//!
//! Template files are loaded by an external collaborator; this module only
//! defines the template type, placeholder rendering, and the library that
//! resolves a prompt id to a template. The reserved id `default` means "no
//! template, use the raw input message" and always resolves.

use crate::error::{ParleyError, Result};
use std::collections::HashMap;

/// Reserved prompt id meaning "no template"
pub const DEFAULT_PROMPT_ID: &str = "default";

/// Placeholder name every template receives with the caller's message
pub const INPUT_VARIABLE: &str = "input";

/// A prompt template with `{name}` placeholders
///
/// # Examples
///
/// ```
/// use parley::prompts::PromptTemplate;
/// use std::collections::HashMap;
///
/// let template = PromptTemplate::new("Tell me a {joke_type} joke about {input}");
/// assert_eq!(template.input_variables(), vec!["joke_type", "input"]);
///
/// let mut vars = HashMap::new();
/// vars.insert("joke_type".to_string(), "Dad".to_string());
/// vars.insert("input".to_string(), "Birds".to_string());
/// assert_eq!(template.render(&vars).unwrap(), "Tell me a Dad joke about Birds");
/// ```
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Creates a template from its source text
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Returns the placeholder names in order of first appearance
    pub fn input_variables(&self) -> Vec<String> {
        let mut variables = Vec::new();
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            rest = &rest[open + 1..];
            if let Some(close) = rest.find('}') {
                let name = &rest[..close];
                if !name.is_empty() && !variables.iter().any(|v| v == name) {
                    variables.push(name.to_string());
                }
                rest = &rest[close + 1..];
            } else {
                break;
            }
        }
        variables
    }

    /// Renders the template with the given variable values
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::InvalidParams`] when a placeholder has no value.
    pub fn render(&self, variables: &HashMap<String, String>) -> Result<String> {
        let mut rendered = self.template.clone();
        for name in self.input_variables() {
            let value = variables.get(&name).ok_or_else(|| {
                ParleyError::InvalidParams(format!("Missing value for prompt variable '{name}'"))
            })?;
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        Ok(rendered)
    }
}

/// Library of configured prompt templates, keyed by prompt id
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    prompts: HashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    /// Builds a library from `(prompt_id, template)` pairs
    ///
    /// Prompt ids are matched case-insensitively; they are lowercased here
    /// and callers' ids are lowercased at resolution time.
    pub fn new(entries: impl IntoIterator<Item = (String, PromptTemplate)>) -> Self {
        Self {
            prompts: entries
                .into_iter()
                .map(|(id, template)| (id.to_lowercase(), template))
                .collect(),
        }
    }

    /// Resolves a prompt id to its template
    ///
    /// Returns `None` for the reserved id [`DEFAULT_PROMPT_ID`], which means
    /// the caller's raw input is used without a template.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::PromptNotFound`] for any other unknown id.
    pub fn resolve(&self, prompt_id: &str) -> Result<Option<&PromptTemplate>> {
        let prompt_id = prompt_id.to_lowercase();
        if prompt_id == DEFAULT_PROMPT_ID {
            return Ok(None);
        }
        self.prompts
            .get(&prompt_id)
            .map(Some)
            .ok_or_else(|| ParleyError::PromptNotFound(prompt_id).into())
    }

    /// Lists the input variables of every configured template
    pub fn describe(&self) -> HashMap<String, Vec<String>> {
        self.prompts
            .iter()
            .map(|(id, template)| (id.clone(), template.input_variables()))
            .collect()
    }
}
