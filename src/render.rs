use crate::context::{value_to_boolean, value_to_display, Context};
use crate::directive::{
    find_binding, find_if, find_interpolation, find_loop, find_show, BindingKind, ConditionalKind,
    Dialect, Directive, DirectiveMatch,
};
use crate::error::{EvalError, RenderError};
use crate::eval::evaluate;
use html_escape::encode_safe;
use serde_json::Value;
use tracing::warn;

/// What to substitute for a directive whose evaluation failed.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum ErrorPolicy {
    /// Empty string, the behavior of the original converters.
    #[default]
    Ignore,
    /// An HTML comment naming the failure, for debugging template data.
    Annotate,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Maximum nesting of loop/conditional bodies before the render fails.
    pub max_depth: usize,
    pub error_policy: ErrorPolicy,
    /// HTML-escape interpolated values. Off by default; the output is then
    /// only as safe as the context values are.
    pub escape_interpolations: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            max_depth: 64,
            error_policy: ErrorPolicy::Ignore,
            escape_interpolations: false,
        }
    }
}

/// Renders a template against a context with default options.
pub fn render(template: &str, context: &Context, dialect: Dialect) -> Result<String, RenderError> {
    render_with(template, context, dialect, &RenderOptions::default())
}

/// Renders a template against a context.
///
/// Individual directive failures degrade to the configured substitution and
/// never abort the render; only exceeding `max_depth` does.
pub fn render_with(
    template: &str,
    context: &Context,
    dialect: Dialect,
    options: &RenderOptions,
) -> Result<String, RenderError> {
    let renderer = Renderer { dialect, options };
    let expanded = renderer.expand(template, context, 0)?;
    Ok(renderer.cleanup(expanded))
}

struct Renderer<'a> {
    dialect: Dialect,
    options: &'a RenderOptions,
}

impl Renderer<'_> {
    // One full expansion of a template fragment: loops, then conditionals,
    // then attribute bindings, then interpolations. Loop and conditional
    // bodies re-enter here one level deeper, so interpolations inside them
    // see the right (possibly loop-scoped) context.
    fn expand(&self, template: &str, context: &Context, depth: usize) -> Result<String, RenderError> {
        if depth > self.options.max_depth {
            return Err(RenderError::DepthExceeded {
                limit: self.options.max_depth,
            });
        }

        let text = self.expand_loops(template, context, depth)?;
        let text = self.expand_conditionals(&text, context, depth, find_if)?;
        let text = self.expand_conditionals(&text, context, depth, find_show)?;
        let text = self.expand_bindings(&text, context);
        let text = self.expand_interpolations(&text, context);
        Ok(text)
    }

    fn expand_loops(
        &self,
        template: &str,
        context: &Context,
        depth: usize,
    ) -> Result<String, RenderError> {
        let mut output = String::with_capacity(template.len());
        let mut cursor = 0;

        while let Some(found) = find_loop(template, self.dialect, cursor) {
            output.push_str(&template[cursor..found.span.start]);
            cursor = found.span.end;

            let (item, source, open, body, close) = match found.directive {
                Directive::Loop {
                    item,
                    source,
                    open,
                    body,
                    close,
                } => (item, source, open, body, close),
                _ => unreachable!("find_loop yields loops"),
            };

            match evaluate(&source, context) {
                Ok(Value::Array(elements)) => {
                    for element in elements {
                        let scope = context.child(&item, element);
                        output.push_str(&open);
                        output.push_str(&self.expand(&body, &scope, depth + 1)?);
                        output.push_str(&close);
                    }
                }
                Ok(value) => {
                    let err = EvalError::type_mismatch(format!(
                        "loop source '{}' is not an array, got {}",
                        source,
                        crate::context::type_name(&value)
                    ));
                    warn!(source = %source, error = %err, "loop directive skipped");
                    output.push_str(&self.degraded(&err));
                }
                Err(err) => {
                    warn!(source = %source, error = %err, "loop directive skipped");
                    output.push_str(&self.degraded(&err));
                }
            }
        }

        output.push_str(&template[cursor..]);
        Ok(output)
    }

    fn expand_conditionals(
        &self,
        template: &str,
        context: &Context,
        depth: usize,
        find: fn(&str, Dialect, usize) -> Option<DirectiveMatch>,
    ) -> Result<String, RenderError> {
        let mut output = String::with_capacity(template.len());
        let mut cursor = 0;

        while let Some(found) = find(template, self.dialect, cursor) {
            output.push_str(&template[cursor..found.span.start]);
            cursor = found.span.end;

            let (condition, open, body, close, kind) = match found.directive {
                Directive::Conditional {
                    condition,
                    open,
                    body,
                    close,
                    kind,
                } => (condition, open, body, close, kind),
                _ => unreachable!("conditional finders yield conditionals"),
            };

            match evaluate(&condition, context) {
                Ok(value) => {
                    let truthy = value_to_boolean(&value);
                    match kind {
                        ConditionalKind::If | ConditionalKind::Inline => {
                            if truthy {
                                output.push_str(&open);
                                output.push_str(&self.expand(&body, context, depth + 1)?);
                                output.push_str(&close);
                            }
                        }
                        // v-show keeps the element either way and hides it
                        // with an inline style when falsy.
                        ConditionalKind::Show => {
                            if truthy {
                                output.push_str(&open);
                            } else {
                                output.push_str(&inject_display_none(&open));
                            }
                            output.push_str(&self.expand(&body, context, depth + 1)?);
                            output.push_str(&close);
                        }
                    }
                }
                Err(err) => {
                    warn!(condition = %condition, error = %err, "conditional directive skipped");
                    output.push_str(&self.degraded(&err));
                }
            }
        }

        output.push_str(&template[cursor..]);
        Ok(output)
    }

    fn expand_bindings(&self, template: &str, context: &Context) -> String {
        let mut output = String::with_capacity(template.len());
        let mut cursor = 0;

        while let Some(found) = find_binding(template, self.dialect, cursor) {
            output.push_str(&template[cursor..found.span.start]);
            cursor = found.span.end;

            let (kind, expr) = match found.directive {
                Directive::Binding { kind, expr } => (kind, expr),
                _ => unreachable!("find_binding yields bindings"),
            };

            match evaluate(&expr, context) {
                Ok(value) => output.push_str(&format_binding(kind, &value)),
                Err(err) => {
                    warn!(expr = %expr, error = %err, "attribute binding left empty");
                    output.push_str(match kind {
                        BindingKind::Class => " class=\"\"",
                        BindingKind::Style => " style=\"\"",
                    });
                }
            }
        }

        output.push_str(&template[cursor..]);
        output
    }

    fn expand_interpolations(&self, template: &str, context: &Context) -> String {
        let mut output = String::with_capacity(template.len());
        let mut cursor = 0;

        while let Some(found) = find_interpolation(template, self.dialect, cursor) {
            output.push_str(&template[cursor..found.span.start]);
            cursor = found.span.end;

            let expr = match found.directive {
                Directive::Interpolation { expr } => expr,
                _ => unreachable!("find_interpolation yields interpolations"),
            };

            match evaluate(&expr, context) {
                Ok(value) => {
                    let shown = value_to_display(&value);
                    if self.options.escape_interpolations {
                        output.push_str(&encode_safe(&shown));
                    } else {
                        output.push_str(&shown);
                    }
                }
                Err(err) => {
                    warn!(expr = %expr, error = %err, "interpolation left empty");
                    output.push_str(&self.degraded(&err));
                }
            }
        }

        output.push_str(&template[cursor..]);
        output
    }

    // Dialect-specific syntax normalization plus removal of leftover
    // directive markers, applied once to the fully expanded text.
    fn cleanup(&self, text: String) -> String {
        match self.dialect {
            Dialect::Bracket => {
                let text = text.replace("className=", "class=");
                let text = expand_self_closing(&text);
                text.replace("<React.Fragment>", "")
                    .replace("</React.Fragment>", "")
                    .replace("<>", "")
                    .replace("</>", "")
            }
            Dialect::Brace => strip_vue_attrs(&text),
        }
    }

    fn degraded(&self, err: &EvalError) -> String {
        match self.options.error_policy {
            ErrorPolicy::Ignore => String::new(),
            ErrorPolicy::Annotate => format!("<!-- vellum: {} -->", err),
        }
    }
}

fn format_binding(kind: BindingKind, value: &Value) -> String {
    match kind {
        BindingKind::Class => {
            let names = match value {
                // Object form: keys whose value is truthy, in written order.
                Value::Object(map) => map
                    .iter()
                    .filter(|(_, v)| value_to_boolean(v))
                    .map(|(k, _)| k.clone())
                    .collect::<Vec<_>>()
                    .join(" "),
                Value::Array(items) => items
                    .iter()
                    .map(value_to_display)
                    .collect::<Vec<_>>()
                    .join(" "),
                v => value_to_display(v),
            };
            format!(" class=\"{}\"", names)
        }
        BindingKind::Style => {
            let css = match value {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", kebab_case(k), value_to_display(v)))
                    .collect::<Vec<_>>()
                    .join("; "),
                v => value_to_display(v),
            };
            format!(" style=\"{}\"", css)
        }
    }
}

// fontSize -> font-size, as the source dialect writes style keys.
fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn inject_display_none(open: &str) -> String {
    if let Some(rest) = open.strip_suffix("/>") {
        format!("{} style=\"display: none;\"/>", rest)
    } else if let Some(rest) = open.strip_suffix('>') {
        format!("{} style=\"display: none;\">", rest)
    } else {
        open.to_string()
    }
}

// `<tag attrs/>` becomes `<tag attrs></tag>`.
fn expand_self_closing(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find('<') {
        let lt = cursor + rel;
        output.push_str(&text[cursor..lt]);

        let name: String = text[lt + 1..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            output.push('<');
            cursor = lt + 1;
            continue;
        }

        match find_open_tag_end(text, lt + 1) {
            Some((gt, true)) => {
                // Everything between the tag name and the trailing slash.
                let attrs = &text[lt + 1 + name.len()..gt - 1];
                output.push('<');
                output.push_str(&name);
                output.push_str(attrs);
                output.push_str("></");
                output.push_str(&name);
                output.push('>');
                cursor = gt + 1;
            }
            Some((gt, false)) => {
                output.push_str(&text[lt..gt + 1]);
                cursor = gt + 1;
            }
            None => {
                output.push('<');
                cursor = lt + 1;
            }
        }
    }

    output.push_str(&text[cursor..]);
    output
}

// Removes leftover `v-something="value"` attributes, whitespace included.
fn strip_vue_attrs(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find("v-") {
        let pos = cursor + rel;

        if pos == 0 || !bytes[pos - 1].is_ascii_whitespace() {
            output.push_str(&text[cursor..pos + 2]);
            cursor = pos + 2;
            continue;
        }

        let name_end = pos
            + text[pos..]
                .chars()
                .take_while(|c| c.is_ascii_alphabetic() || *c == '-')
                .map(char::len_utf8)
                .sum::<usize>();

        match read_attr_value_span(text, name_end) {
            Some(end) => {
                // Also swallow the whitespace run before the attribute.
                let mut ws_start = pos;
                while ws_start > 0 && bytes[ws_start - 1].is_ascii_whitespace() {
                    ws_start -= 1;
                }
                output.push_str(&text[cursor..ws_start]);
                cursor = end;
            }
            None => {
                output.push_str(&text[cursor..pos + 2]);
                cursor = pos + 2;
            }
        }
    }

    output.push_str(&text[cursor..]);
    output
}

fn read_attr_value_span(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if bytes.get(i) != Some(&b'=') {
        return None;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let quote = match bytes.get(i) {
        Some(q @ (b'"' | b'\'')) => *q,
        _ => return None,
    };
    let close = text[i + 1..].find(quote as char)? + i + 1;
    Some(close + 1)
}

// Quote-aware scan for the '>' ending an open tag.
fn find_open_tag_end(text: &str, from: usize) -> Option<(usize, bool)> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'\'' {
                    quote = Some(b);
                } else if b == b'>' {
                    return Some((i, i > from && bytes[i - 1] == b'/'));
                } else if b == b'<' {
                    // A new tag opened before this one closed; bail out.
                    return None;
                }
            }
        }
        i += 1;
    }

    None
}

#[cfg(test)]
use serde_json::json;

#[test]
fn literal_template_is_identity() {
    let context = Context::new(json!({ "unused": 1 }));
    let template = "<html><body><p>plain text</p></body></html>";

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        template
    );
    assert_eq!(
        render(template, &context, Dialect::Bracket).unwrap(),
        template
    );
}

#[test]
fn interpolation_both_dialects() {
    let context = Context::new(json!({ "name": "John" }));

    assert_eq!(
        render("<div>{{ name }}</div>", &context, Dialect::Brace).unwrap(),
        "<div>John</div>"
    );
    assert_eq!(
        render("<div>{name}</div>", &context, Dialect::Bracket).unwrap(),
        "<div>John</div>"
    );
}

#[test]
fn missing_reference_renders_empty() {
    let context = Context::new(json!({}));

    assert_eq!(
        render("{missing}", &context, Dialect::Bracket).unwrap(),
        ""
    );
    assert_eq!(
        render("<p>{{ missing }}</p>", &context, Dialect::Brace).unwrap(),
        "<p></p>"
    );
}

#[test]
fn annotate_policy_marks_failures() {
    let context = Context::new(json!({}));
    let options = RenderOptions {
        error_policy: ErrorPolicy::Annotate,
        ..RenderOptions::default()
    };

    let out = render_with("{missing}", &context, Dialect::Bracket, &options).unwrap();
    assert!(out.contains("<!-- vellum:"));
    assert!(out.contains("missing"));
}

#[test]
fn brace_loop_renders_in_order() {
    let context = Context::new(json!({ "items": ["a", "b", "c"] }));
    let template = r#"<ul><li v-for="item in items">{{ item }}</li></ul>"#;

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        "<ul><li>a</li><li>b</li><li>c</li></ul>"
    );
}

#[test]
fn empty_loop_source_renders_nothing() {
    let context = Context::new(json!({ "items": [] }));
    let template = r#"<ul><li v-for="item in items">{{ item }}</li></ul>"#;

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        "<ul></ul>"
    );
}

#[test]
fn non_array_loop_source_degrades_to_empty() {
    let context = Context::new(json!({ "items": 7 }));
    let template = r#"<ul><li v-for="item in items">{{ item }}</li></ul>"#;

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        "<ul></ul>"
    );
}

#[test]
fn loop_scope_does_not_leak_to_siblings() {
    let context = Context::new(json!({ "items": ["x"] }));
    let template = r#"<li v-for="item in items">{{ item }}</li><p>{{ item }}</p>"#;

    // The trailing interpolation is outside the loop and must not see the
    // loop variable.
    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        "<li>x</li><p></p>"
    );
}

#[test]
fn nested_loops_bind_inner_scope() {
    let context = Context::new(json!({
        "rows": [
            { "cells": [1, 2] },
            { "cells": [3] }
        ]
    }));
    let template =
        r#"<tr v-for="row in rows"><td v-for="cell in row.cells">{{ cell }}</td></tr>"#;

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        "<tr><td>1</td><td>2</td></tr><tr><td>3</td></tr>"
    );
}

#[test]
fn bracket_loop_over_line_items() {
    let context = Context::new(json!({
        "lineItems": [
            { "item": "Surf Board", "price": "$1,000" },
            { "item": "Board Wax", "price": "$75" }
        ]
    }));
    let template = "<tbody>{lineItems.map(lineItem => (<tr><td>{lineItem.item}</td><td>{lineItem.price}</td></tr>))}</tbody>";

    assert_eq!(
        render(template, &context, Dialect::Bracket).unwrap(),
        "<tbody><tr><td>Surf Board</td><td>$1,000</td></tr><tr><td>Board Wax</td><td>$75</td></tr></tbody>"
    );
}

#[test]
fn conditional_blocks() {
    let template = r#"<div v-if="showHeader"><p>Header</p></div>"#;

    let shown = Context::new(json!({ "showHeader": true }));
    assert_eq!(
        render(template, &shown, Dialect::Brace).unwrap(),
        "<div><p>Header</p></div>"
    );

    for falsy in [json!(false), json!(0), json!(""), json!(null)] {
        let hidden = Context::new(json!({ "showHeader": falsy }));
        assert_eq!(render(template, &hidden, Dialect::Brace).unwrap(), "");
    }

    // Missing reference counts as falsy-by-failure.
    let missing = Context::new(json!({}));
    assert_eq!(render(template, &missing, Dialect::Brace).unwrap(), "");
}

#[test]
fn inline_conditional_bracket() {
    let template = "<p>{paid && <b>settled</b>}</p>";

    let yes = Context::new(json!({ "paid": true }));
    assert_eq!(
        render(template, &yes, Dialect::Bracket).unwrap(),
        "<p><b>settled</b></p>"
    );

    let no = Context::new(json!({ "paid": false }));
    assert_eq!(render(template, &no, Dialect::Bracket).unwrap(), "<p></p>");
}

#[test]
fn v_show_toggles_display_style() {
    let template = r#"<div v-show="visible" class="total">Sum</div>"#;

    let shown = Context::new(json!({ "visible": true }));
    assert_eq!(
        render(template, &shown, Dialect::Brace).unwrap(),
        r#"<div class="total">Sum</div>"#
    );

    let hidden = Context::new(json!({ "visible": false }));
    assert_eq!(
        render(template, &hidden, Dialect::Brace).unwrap(),
        r#"<div class="total" style="display: none;">Sum</div>"#
    );
}

#[test]
fn class_binding_object_keeps_truthy_keys_in_order() {
    let context = Context::new(json!({ "isActive": true }));
    let template = r#"<div :class="{ active: isActive, hidden: !isActive }">x</div>"#;

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        r#"<div class="active">x</div>"#
    );
}

#[test]
fn style_binding_object_kebab_cases_keys() {
    let context = Context::new(json!({ "styles": { "color": "red", "fontSize": "14px" } }));
    let template = r#"<div :style="styles">x</div>"#;

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        r#"<div style="color: red; font-size: 14px">x</div>"#
    );
}

#[test]
fn failed_binding_renders_empty_attribute() {
    let context = Context::new(json!({}));
    let template = r#"<div :class="nope">x</div>"#;

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        r#"<div class="">x</div>"#
    );
}

#[test]
fn bracket_class_binding() {
    let context = Context::new(json!({ "active": true }));
    let template = r#"<div className={{ on: active, off: !active }}>x</div>"#;

    assert_eq!(
        render(template, &context, Dialect::Bracket).unwrap(),
        r#"<div class="on">x</div>"#
    );
}

#[test]
fn cleanup_normalizes_bracket_syntax() {
    let context = Context::new(json!({}));
    let template = r#"<React.Fragment><div className="box"><br/></div></React.Fragment>"#;

    assert_eq!(
        render(template, &context, Dialect::Bracket).unwrap(),
        r#"<div class="box"><br></br></div>"#
    );
}

#[test]
fn cleanup_strips_leftover_vue_attrs() {
    let context = Context::new(json!({}));
    let template = r#"<div v-model="field" id="a">x</div>"#;

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        r#"<div id="a">x</div>"#
    );
}

#[test]
fn rendered_output_is_idempotent() {
    let context = Context::new(json!({ "name": "Jo", "items": ["a"] }));
    let template =
        r#"<ul><li v-for="item in items">{{ item }}</li></ul><p>{{ name }}</p>"#;

    let once = render(template, &context, Dialect::Brace).unwrap();
    let twice = render(&once, &context, Dialect::Brace).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn depth_bound_fails_whole_render() {
    let context = Context::new(json!({ "items": [1, 2] }));
    let template = r#"<li v-for="a in items"><li v-for="b in items">{{ b }}</li></li>"#;
    let options = RenderOptions {
        max_depth: 1,
        ..RenderOptions::default()
    };

    assert_eq!(
        render_with(template, &context, Dialect::Brace, &options),
        Err(RenderError::DepthExceeded { limit: 1 })
    );
}

#[test]
fn escaped_interpolations() {
    let context = Context::new(json!({ "name": "<b>Jo</b>" }));
    let options = RenderOptions {
        escape_interpolations: true,
        ..RenderOptions::default()
    };

    let out = render_with("<p>{{ name }}</p>", &context, Dialect::Brace, &options).unwrap();
    assert_eq!(out, "<p>&lt;b&gt;Jo&lt;/b&gt;</p>");
}

#[test]
fn ternary_and_concat_inside_interpolation() {
    let context = Context::new(json!({ "paid": false, "total": 42 }));

    assert_eq!(
        render(
            "<td>{{ paid ? 'settled' : 'due' }}: {{ '$' + total }}</td>",
            &context,
            Dialect::Brace
        )
        .unwrap(),
        "<td>due: $42</td>"
    );
}
