//! Prompt template engine.
//!
//! Agent prompts are Tera templates rendered against a flat map of string
//! inputs (agent identity, tool catalog, transcript, SOP projections, and
//! any user-supplied variables).

use crate::error::{Error, Result};
use std::collections::HashMap;
use tera::{Context, Tera};

const TEMPLATE_NAME: &str = "prompt";

/// Compiled prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    tera: Tera,
    source: String,
}

impl PromptTemplate {
    /// Compile a template; fails on syntax errors or empty text.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(Error::MissingPrompt);
        }

        let mut tera = Tera::default();
        // Prompts are plain text, never HTML.
        tera.autoescape_on(vec![]);
        tera.add_raw_template(TEMPLATE_NAME, &source)
            .map_err(|e| Error::template(format!("parse prompt template error: {}", e)))?;

        Ok(Self { tera, source })
    }

    /// Render with the given inputs. Missing inputs render as empty strings
    /// only if the template guards them; otherwise rendering fails.
    pub fn render(&self, inputs: &HashMap<String, String>) -> Result<String> {
        let mut context = Context::new();
        for (key, value) in inputs {
            context.insert(key.as_str(), value);
        }

        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| Error::template(e.to_string()))
    }

    /// Original template text.
    pub fn source(&self) -> &str {
        &self.source
    }
}
