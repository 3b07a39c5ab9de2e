use crate::context::Context;
use crate::directive::Dialect;
use crate::error::RenderError;
use crate::render::{render_with, RenderOptions};
use serde_json::Value;
use std::collections::HashMap;

/// Named-template registry for hosts that render the same templates
/// repeatedly.
///
/// This is an explicit cache object owned by the caller; the crate itself
/// keeps no global state.
#[derive(Debug, Default)]
pub struct Templates {
    templates: HashMap<String, (String, Dialect)>,
    options: RenderOptions,
}

impl Templates {
    pub fn new() -> Self {
        Templates::default()
    }

    /// A registry whose renders use `options` instead of the defaults.
    pub fn with_options(options: RenderOptions) -> Self {
        Templates {
            templates: HashMap::new(),
            options,
        }
    }

    /// Registers a template under a name.
    ///
    /// If there is already a template with the same name, this returns an
    /// error.
    ///
    /// # Examples
    ///
    /// ```
    /// let mut templates = vellum::Templates::new();
    /// templates
    ///     .add("greeting", "<p>{{ name }}</p>", vellum::Dialect::Brace)
    ///     .unwrap();
    /// ```
    pub fn add(
        &mut self,
        name: impl Into<String>,
        template: impl Into<String>,
        dialect: Dialect,
    ) -> Result<&mut Self, RenderError> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(RenderError::DuplicateTemplate { name });
        }

        self.templates.insert(name, (template.into(), dialect));
        Ok(self)
    }

    /// Renders a registered template with the provided context value.
    ///
    /// # Examples
    ///
    /// ```
    /// let mut templates = vellum::Templates::new();
    /// templates
    ///     .add("greeting", "<p>{{ name }}</p>", vellum::Dialect::Brace)
    ///     .unwrap();
    ///
    /// let html = templates
    ///     .render("greeting", serde_json::json!({ "name": "John" }))
    ///     .unwrap();
    /// assert_eq!(html, "<p>John</p>");
    /// ```
    pub fn render(&self, name: &str, value: Value) -> Result<String, RenderError> {
        match self.templates.get(name) {
            Some((template, dialect)) => {
                render_with(template, &Context::new(value), *dialect, &self.options)
            }
            None => Err(RenderError::TemplateNotFound {
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
use serde_json::json;

#[test]
fn render_registered_template() {
    let mut templates = Templates::new();
    templates
        .add("row", "<td>{{ item }}</td>", Dialect::Brace)
        .unwrap();

    assert_eq!(
        templates.render("row", json!({ "item": "Wax" })).unwrap(),
        "<td>Wax</td>"
    );
}

#[test]
fn duplicate_and_missing_names_are_errors() {
    let mut templates = Templates::new();
    templates.add("a", "x", Dialect::Bracket).unwrap();

    assert_eq!(
        templates.add("a", "y", Dialect::Bracket).unwrap_err(),
        RenderError::DuplicateTemplate {
            name: "a".to_string()
        }
    );
    assert_eq!(
        templates.render("b", json!({})).unwrap_err(),
        RenderError::TemplateNotFound {
            name: "b".to_string()
        }
    );
}

#[test]
fn registry_options_apply_to_renders() {
    use crate::render::ErrorPolicy;

    let mut templates = Templates::with_options(RenderOptions {
        error_policy: ErrorPolicy::Annotate,
        ..RenderOptions::default()
    });
    templates.add("t", "{missing}", Dialect::Bracket).unwrap();

    let out = templates.render("t", json!({})).unwrap();
    assert!(out.contains("<!-- vellum:"));
}
