//! Vellum, a template-to-HTML converter.
//!
//! Vellum renders JSX-like ("bracket") and Vue-like ("brace") template
//! strings against a JSON context: interpolations, repeat-over-array loops,
//! conditional blocks and class/style attribute bindings. Expressions are
//! parsed with a restricted grammar and evaluated only against the supplied
//! context; there is no embedded scripting.
//!
//! Rendering is a pure function of (template, context, options). Failed
//! expressions degrade to empty output for their span and are logged; the
//! output is not HTML-escaped by default, so untrusted context values need
//! [`RenderOptions::escape_interpolations`] or downstream sanitization.
//!
//! ```
//! use vellum::{render, Context, Dialect};
//!
//! let context = Context::new(serde_json::json!({ "name": "John" }));
//! let html = render("<div>{{ name }}</div>", &context, Dialect::Brace).unwrap();
//! assert_eq!(html, "<div>John</div>");
//! ```
mod context;
mod directive;
mod engine;
mod error;
mod eval;
mod expr;
mod render;

pub use crate::context::Context;
pub use crate::directive::{
    BindingKind, ConditionalKind, Dialect, Directive, DirectiveMatch, Directives,
};
pub use crate::engine::Templates;
pub use crate::error::{EvalError, RenderError};
pub use crate::eval::{evaluate, Eval};
pub use crate::render::{render, render_with, ErrorPolicy, RenderOptions};
