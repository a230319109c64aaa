//! Cross-project reference rewriting
//!
//! Turns `{{ ref('orders') }}` into `{{ ref('finance', 'orders') }}` once
//! `orders` lives in the `finance` project. Only single-argument refs to the
//! exact model name are touched; an optional version argument is kept.

use regex::{Captures, Regex};

/// Rewrites refs to one model into the project-qualified form
#[derive(Debug, Clone)]
pub struct ReferenceRewriter {
    pattern: Regex,
    model: String,
    project: String,
}

impl ReferenceRewriter {
    pub fn new(model: &str, project: &str) -> Result<Self, regex::Error> {
        let name = regex::escape(model);
        let pattern = Regex::new(&format!(
            r#"\bref\(\s*(?:'(?P<single>{name})'|"(?P<double>{name})")(?P<version>\s*,\s*(?:v|version)\s*=\s*[^)]*?)?\s*\)"#
        ))?;

        Ok(Self {
            pattern,
            model: model.to_string(),
            project: project.to_string(),
        })
    }

    /// Rewritten code, or `None` when there was nothing to rewrite
    pub fn rewrite(&self, code: &str) -> Option<String> {
        if !self.pattern.is_match(code) {
            return None;
        }

        let rewritten = self.pattern.replace_all(code, |caps: &Captures| {
            let quote = if caps.name("single").is_some() { '\'' } else { '"' };
            let version = caps.name("version").map_or("", |m| m.as_str());
            format!(
                "ref({quote}{}{quote}, {quote}{}{quote}{version})",
                self.project, self.model
            )
        });

        Some(rewritten.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> ReferenceRewriter {
        ReferenceRewriter::new("orders", "finance").unwrap()
    }

    #[test]
    fn qualifies_single_argument_refs() {
        let code = "select * from {{ ref('orders') }} join {{ ref(\"orders\") }} using (id)";
        assert_eq!(
            rewriter().rewrite(code).unwrap(),
            "select * from {{ ref('finance', 'orders') }} join {{ ref(\"finance\", \"orders\") }} using (id)"
        );
    }

    #[test]
    fn keeps_version_argument() {
        let code = "select * from {{ ref('orders', v=2) }}";
        assert_eq!(
            rewriter().rewrite(code).unwrap(),
            "select * from {{ ref('finance', 'orders', v=2) }}"
        );
    }

    #[test]
    fn leaves_similar_text_alone() {
        let code = "-- orders\nselect orders.id from {{ ref('orders_daily') }} as orders, {{ xref('orders') }}";
        assert_eq!(rewriter().rewrite(code), None);
    }

    #[test]
    fn already_qualified_refs_are_untouched() {
        let code = "select * from {{ ref('finance', 'orders') }}";
        assert_eq!(rewriter().rewrite(code), None);
    }
}
