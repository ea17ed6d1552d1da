//! Single-pass cypher template renderer with caching
//!
//! Templates are tokenized once and the token list cached, so a
//! template repeated for every row of an entity is only parsed once.
//!
//! Placeholders are `{{name}}` or `{{name.path}}`, resolved against the
//! [`BindingContext`]. A placeholder that resolves to nothing renders
//! as the empty string; rendered statements never contain `{{` litter.

use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::context::{value_to_string, BindingContext};
use crate::error::ImportError;

/// Token representing a parsed template fragment
#[derive(Debug, Clone)]
pub enum Token {
    /// Literal text (stores range in the original string)
    Literal(Range<usize>),
    /// Context reference: {{name}} or {{name.field}}
    Var(String),
}

/// Template renderer with a parse cache
pub struct TemplateRenderer {
    cache: DashMap<String, Arc<Vec<Token>>>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Parse a template into tokens (with caching)
    pub fn tokenize(&self, template: &str) -> Arc<Vec<Token>> {
        if let Some(cached) = self.cache.get(template) {
            return Arc::clone(&cached);
        }

        let mut tokens = Vec::new();
        let mut literal_start = 0;
        let mut rest = 0;

        while let Some(open) = template[rest..].find("{{") {
            let open = rest + open;
            match template[open + 2..].find("}}") {
                Some(close) => {
                    let close = open + 2 + close;
                    let path = template[open + 2..close].trim();
                    if path.is_empty() {
                        // "{{}}" stays literal
                        rest = close + 2;
                        continue;
                    }
                    if open > literal_start {
                        tokens.push(Token::Literal(literal_start..open));
                    }
                    tokens.push(Token::Var(path.to_string()));
                    literal_start = close + 2;
                    rest = close + 2;
                }
                // Unterminated "{{" stays literal
                None => break,
            }
        }

        if literal_start < template.len() {
            tokens.push(Token::Literal(literal_start..template.len()));
        }

        let tokens = Arc::new(tokens);
        self.cache.insert(template.to_string(), tokens.clone());
        tokens
    }

    /// Render a template against the context using pre-parsed tokens
    pub fn render(&self, template: &str, ctx: &BindingContext) -> Result<String, ImportError> {
        let tokens = self.tokenize(template);

        let mut result = String::with_capacity(template.len() * 2);
        for token in tokens.iter() {
            match token {
                Token::Literal(range) => result.push_str(&template[range.clone()]),
                Token::Var(path) => {
                    if let Some(value) = ctx.resolve_path(path) {
                        result.push_str(&value_to_string(value));
                    }
                    // Unresolved placeholders render empty
                }
            }
        }

        Ok(result)
    }
}

/// Global renderer instance
pub static RENDERER: Lazy<TemplateRenderer> = Lazy::new(TemplateRenderer::new);

/// Convenience function for rendering against the global cache
pub fn render(template: &str, ctx: &BindingContext) -> Result<String, ImportError> {
    RENDERER.render(template, ctx)
}
