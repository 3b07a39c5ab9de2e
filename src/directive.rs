use std::ops::Range;

/// Template dialect selecting the directive surface syntax. Both dialects
/// share the same expression grammar and loop/conditional semantics.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Dialect {
    /// JSX-like: `{expr}` interpolation, `{items.map(item => (...))}` loops,
    /// `{cond && <markup>}` conditionals, `className={expr}` bindings.
    Bracket,
    /// Vue-like: `{{ expr }}` interpolation, `v-for`, `v-if`/`v-show`,
    /// `:class`/`:style` bindings.
    Brace,
}

/// One recognized directive occurrence and the exact text span it replaces.
#[derive(PartialEq, Debug)]
pub struct DirectiveMatch {
    pub span: Range<usize>,
    pub directive: Directive,
}

#[derive(PartialEq, Debug)]
pub enum Directive {
    /// Bare expression span standing for a single evaluated value.
    Interpolation { expr: String },
    /// Repeat-over-array block. `open`/`close` carry the repeated element's
    /// shell for the brace dialect; the bracket form has none.
    Loop {
        item: String,
        source: String,
        open: String,
        body: String,
        close: String,
    },
    /// Render-only-if block.
    Conditional {
        condition: String,
        open: String,
        body: String,
        close: String,
        kind: ConditionalKind,
    },
    /// A `class`/`style` attribute whose value is an expression.
    Binding { kind: BindingKind, expr: String },
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ConditionalKind {
    /// Element dropped entirely when falsy (`v-if`).
    If,
    /// Element kept, hidden with an inline display style when falsy
    /// (`v-show`).
    Show,
    /// `{cond && body}` fragment form of the bracket dialect.
    Inline,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BindingKind {
    Class,
    Style,
}

/// Lazy single-pass enumeration of the directives in a template, yielded in
/// the fixed family precedence order (loops, conditionals, attribute
/// bindings, interpolations) and positional order within a family. A span
/// claimed by an earlier family is not re-reported, so e.g. interpolations
/// inside a loop body stay owned by the loop.
pub struct Directives<'a> {
    text: &'a str,
    dialect: Dialect,
    stage: usize,
    cursor: usize,
    claimed: Vec<Range<usize>>,
}

impl<'a> Directives<'a> {
    pub fn new(text: &'a str, dialect: Dialect) -> Self {
        Directives {
            text,
            dialect,
            stage: 0,
            cursor: 0,
            claimed: Vec::new(),
        }
    }
}

impl<'a> Iterator for Directives<'a> {
    type Item = DirectiveMatch;

    fn next(&mut self) -> Option<DirectiveMatch> {
        loop {
            let found = match self.stage {
                0 => find_loop(self.text, self.dialect, self.cursor),
                1 => find_if(self.text, self.dialect, self.cursor),
                2 => find_show(self.text, self.dialect, self.cursor),
                3 => find_binding(self.text, self.dialect, self.cursor),
                4 => find_interpolation(self.text, self.dialect, self.cursor),
                _ => return None,
            };

            match found {
                Some(found) => {
                    self.cursor = found.span.end;
                    let overlaps = self
                        .claimed
                        .iter()
                        .any(|c| found.span.start < c.end && c.start < found.span.end);
                    if !overlaps {
                        self.claimed.push(found.span.clone());
                        return Some(found);
                    }
                }
                None => {
                    self.stage += 1;
                    self.cursor = 0;
                }
            }
        }
    }
}

/// First loop directive at or after `from`.
pub fn find_loop(text: &str, dialect: Dialect, from: usize) -> Option<DirectiveMatch> {
    match dialect {
        Dialect::Bracket => find_bracket_loop(text, from),
        Dialect::Brace => find_element_directive(text, "v-for", from).and_then(|elem| {
            let (item, source) = elem.value.split_once(" in ")?;
            Some(DirectiveMatch {
                span: elem.span,
                directive: Directive::Loop {
                    item: item.trim().to_string(),
                    source: source.trim().to_string(),
                    open: elem.open,
                    body: elem.body,
                    close: elem.close,
                },
            })
        }),
    }
}

/// First drop-when-falsy conditional at or after `from`.
pub fn find_if(text: &str, dialect: Dialect, from: usize) -> Option<DirectiveMatch> {
    match dialect {
        Dialect::Bracket => find_bracket_conditional(text, from),
        Dialect::Brace => find_element_directive(text, "v-if", from).map(|elem| DirectiveMatch {
            span: elem.span,
            directive: Directive::Conditional {
                condition: elem.value.trim().to_string(),
                open: elem.open,
                body: elem.body,
                close: elem.close,
                kind: ConditionalKind::If,
            },
        }),
    }
}

/// First hide-when-falsy conditional at or after `from` (brace dialect only).
pub fn find_show(text: &str, dialect: Dialect, from: usize) -> Option<DirectiveMatch> {
    match dialect {
        Dialect::Bracket => None,
        Dialect::Brace => find_element_directive(text, "v-show", from).map(|elem| DirectiveMatch {
            span: elem.span,
            directive: Directive::Conditional {
                condition: elem.value.trim().to_string(),
                open: elem.open,
                body: elem.body,
                close: elem.close,
                kind: ConditionalKind::Show,
            },
        }),
    }
}

/// First class/style attribute binding at or after `from`.
pub fn find_binding(text: &str, dialect: Dialect, from: usize) -> Option<DirectiveMatch> {
    let markers: &[(&str, BindingKind)] = match dialect {
        Dialect::Brace => &[
            ("v-bind:class", BindingKind::Class),
            ("v-bind:style", BindingKind::Style),
            (":class", BindingKind::Class),
            (":style", BindingKind::Style),
        ],
        Dialect::Bracket => &[
            ("className", BindingKind::Class),
            ("class", BindingKind::Class),
            ("style", BindingKind::Style),
        ],
    };

    // Byte-wise scan; the markers are ASCII so offsets stay on char
    // boundaries wherever a marker actually matches.
    let bytes = text.as_bytes();
    let mut pos = from;
    while pos < bytes.len() {
        let hit = markers
            .iter()
            .find(|(marker, _)| bytes[pos..].starts_with(marker.as_bytes()))
            .copied();

        let (marker, kind) = match hit {
            Some(hit) => hit,
            None => {
                pos += 1;
                continue;
            }
        };

        // The marker must be a whole attribute name preceded by whitespace.
        if pos == 0 || !bytes[pos - 1].is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let after = pos + marker.len();
        let value = match dialect {
            Dialect::Brace => read_quoted_attr_value(text, after),
            Dialect::Bracket => read_braced_attr_value(text, after),
        };

        match value {
            Some((expr, end)) => {
                let start = leading_whitespace_start(text, pos);
                return Some(DirectiveMatch {
                    span: start..end,
                    directive: Directive::Binding {
                        kind,
                        expr: expr.trim().to_string(),
                    },
                });
            }
            None => {
                pos += 1;
            }
        }
    }

    None
}

/// First bare interpolation at or after `from`.
pub fn find_interpolation(text: &str, dialect: Dialect, from: usize) -> Option<DirectiveMatch> {
    match dialect {
        Dialect::Bracket => {
            let mut pos = from;
            while let Some(open) = find_from(text, pos, "{") {
                match find_balanced_brace(text, open) {
                    Some(close) => {
                        let expr = text[open + 1..close].trim();
                        if !expr.is_empty() {
                            return Some(DirectiveMatch {
                                span: open..close + 1,
                                directive: Directive::Interpolation {
                                    expr: expr.to_string(),
                                },
                            });
                        }
                        pos = open + 1;
                    }
                    None => pos = open + 1,
                }
            }
            None
        }
        Dialect::Brace => {
            let mut pos = from;
            while let Some(open) = find_from(text, pos, "{{") {
                match find_from(text, open + 2, "}}") {
                    Some(close) => {
                        let expr = text[open + 2..close].trim();
                        if !expr.is_empty() {
                            return Some(DirectiveMatch {
                                span: open..close + 2,
                                directive: Directive::Interpolation {
                                    expr: expr.to_string(),
                                },
                            });
                        }
                        pos = open + 2;
                    }
                    None => return None,
                }
            }
            None
        }
    }
}

// {source.map(item => ( body ))}
fn find_bracket_loop(text: &str, from: usize) -> Option<DirectiveMatch> {
    let mut pos = from;

    while let Some(map_pos) = find_from(text, pos, ".map(") {
        pos = map_pos + 1;

        let open = match text[from..map_pos].rfind('{') {
            Some(rel) => from + rel,
            None => continue,
        };
        let source = text[open + 1..map_pos].trim();
        if source.is_empty() || source.contains('}') {
            continue;
        }

        let mut cursor = map_pos + ".map(".len();
        cursor = skip_whitespace(text, cursor);
        let (item, after_item) = match read_ident(text, cursor) {
            Some(found) => found,
            None => continue,
        };
        cursor = skip_whitespace(text, after_item);
        if !text[cursor..].starts_with("=>") {
            continue;
        }
        cursor = skip_whitespace(text, cursor + 2);
        if !text[cursor..].starts_with('(') {
            continue;
        }

        let body_close = match find_balanced_paren(text, cursor) {
            Some(found) => found,
            None => continue,
        };
        let body = &text[cursor + 1..body_close];

        let mut end = skip_whitespace(text, body_close + 1);
        if !text[end..].starts_with(')') {
            continue;
        }
        end = skip_whitespace(text, end + 1);
        if !text[end..].starts_with('}') {
            continue;
        }

        return Some(DirectiveMatch {
            span: open..end + 1,
            directive: Directive::Loop {
                item,
                source: source.to_string(),
                open: String::new(),
                body: body.to_string(),
                close: String::new(),
            },
        });
    }

    None
}

// {cond && body}
fn find_bracket_conditional(text: &str, from: usize) -> Option<DirectiveMatch> {
    let mut pos = from;

    while let Some(open) = find_from(text, pos, "{") {
        pos = open + 1;

        let close = match find_balanced_brace(text, open) {
            Some(found) => found,
            None => continue,
        };
        let inner = &text[open + 1..close];

        let and_pos = match find_top_level_and(inner) {
            Some(found) => found,
            None => continue,
        };

        let condition = inner[..and_pos].trim();
        let body = inner[and_pos + 2..].trim();
        if condition.is_empty() || body.is_empty() {
            continue;
        }

        return Some(DirectiveMatch {
            span: open..close + 1,
            directive: Directive::Conditional {
                condition: condition.to_string(),
                open: String::new(),
                body: body.to_string(),
                close: String::new(),
                kind: ConditionalKind::Inline,
            },
        });
    }

    None
}

struct ElementMatch {
    span: Range<usize>,
    // The open tag rebuilt without the directive attribute.
    open: String,
    body: String,
    close: String,
    value: String,
}

// Finds the next element carrying `attr="..."` and resolves its full span,
// matching the close tag with an open/close depth counter for the element's
// own tag name so nested same-tag structures pair correctly.
fn find_element_directive(text: &str, attr: &str, from: usize) -> Option<ElementMatch> {
    let bytes = text.as_bytes();
    let mut search = from;

    'occurrence: while let Some(attr_pos) = find_from(text, search, attr) {
        search = attr_pos + 1;

        if attr_pos == 0 || !bytes[attr_pos - 1].is_ascii_whitespace() {
            continue;
        }

        let (value, value_end) = match read_quoted_attr_value(text, attr_pos + attr.len()) {
            Some(found) => found,
            None => continue,
        };

        // The enclosing open tag: the nearest '<' before the attribute, whose
        // quote-aware '>' must come after the attribute value.
        let tag_start = match text[..attr_pos].rfind('<') {
            Some(found) => found,
            None => continue,
        };
        let name = read_tag_name(text, tag_start + 1);
        if name.is_empty() {
            continue;
        }
        let (tag_end, self_closing) = match find_tag_end(text, tag_start + 1) {
            Some(found) => found,
            None => continue,
        };
        if tag_end < value_end {
            continue 'occurrence;
        }

        let attr_start = leading_whitespace_start(text, attr_pos);
        let open = format!("{}{}", &text[tag_start..attr_start], &text[value_end..tag_end + 1]);

        if self_closing {
            return Some(ElementMatch {
                span: tag_start..tag_end + 1,
                open,
                body: String::new(),
                close: String::new(),
                value,
            });
        }

        let (close_start, close_end) = match find_matching_close(text, &name, tag_end + 1) {
            Some(found) => found,
            None => continue,
        };

        return Some(ElementMatch {
            span: tag_start..close_end,
            open,
            body: text[tag_end + 1..close_start].to_string(),
            close: text[close_start..close_end].to_string(),
            value,
        });
    }

    None
}

// Byte span of the matching `</name>` for an element whose open tag ends
// just before `from`, honoring nesting of the same tag name.
fn find_matching_close(text: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let open_marker = format!("<{}", name);
    let close_marker = format!("</{}", name);
    let mut depth = 1usize;
    let mut cursor = from;

    loop {
        let next_open = find_tag_marker(text, cursor, &open_marker);
        let next_close = find_tag_marker(text, cursor, &close_marker);

        match (next_open, next_close) {
            (Some(open_pos), close) if close.is_none() || open_pos < close.unwrap() => {
                let (tag_end, self_closing) = find_tag_end(text, open_pos + 1)?;
                if !self_closing {
                    depth += 1;
                }
                cursor = tag_end + 1;
            }
            (_, Some(close_pos)) => {
                let tag_end = find_from(text, close_pos, ">")?;
                depth -= 1;
                if depth == 0 {
                    return Some((close_pos, tag_end + 1));
                }
                cursor = tag_end + 1;
            }
            (_, None) => return None,
        }
    }
}

// Next occurrence of `marker` that ends on a tag-name boundary.
fn find_tag_marker(text: &str, from: usize, marker: &str) -> Option<usize> {
    let mut cursor = from;
    while let Some(pos) = find_from(text, cursor, marker) {
        match text[pos + marker.len()..].chars().next() {
            Some(c) if c.is_ascii_whitespace() || c == '>' || c == '/' => return Some(pos),
            None => return None,
            _ => cursor = pos + 1,
        }
    }
    None
}

// Index of '>' closing an open tag, skipping quoted attribute values.
fn find_tag_end(text: &str, from: usize) -> Option<(usize, bool)> {
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
                    let self_closing = i > from && bytes[i - 1] == b'/';
                    return Some((i, self_closing));
                }
            }
        }
        i += 1;
    }

    None
}

fn read_tag_name(text: &str, from: usize) -> String {
    text[from..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

// `= "value"` with optional whitespace; returns (value, index past quote).
fn read_quoted_attr_value(text: &str, from: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let mut cursor = skip_whitespace(text, from);
    if bytes.get(cursor) != Some(&b'=') {
        return None;
    }
    cursor = skip_whitespace(text, cursor + 1);

    let quote = match bytes.get(cursor) {
        Some(q @ (b'"' | b'\'')) => *q,
        _ => return None,
    };
    let value_start = cursor + 1;
    let close = text[value_start..].find(quote as char)? + value_start;

    Some((text[value_start..close].to_string(), close + 1))
}

// `={expr}` for the bracket dialect; returns (expr, index past brace).
fn read_braced_attr_value(text: &str, from: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let mut cursor = skip_whitespace(text, from);
    if bytes.get(cursor) != Some(&b'=') {
        return None;
    }
    cursor = skip_whitespace(text, cursor + 1);
    if bytes.get(cursor) != Some(&b'{') {
        return None;
    }

    let close = find_balanced_brace(text, cursor)?;
    Some((text[cursor + 1..close].to_string(), close + 1))
}

// Matching '}' for the '{' at `open`, counting nested braces.
fn find_balanced_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

// Matching ')' for the '(' at `open`.
fn find_balanced_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

// First "&&" outside any parentheses or braces.
fn find_top_level_and(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;

    while i + 1 < bytes.len() {
        match bytes[i] {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth -= 1,
            b'&' if depth == 0 && bytes[i + 1] == b'&' => return Some(i),
            _ => {}
        }
        i += 1;
    }

    None
}

fn find_from(text: &str, from: usize, needle: &str) -> Option<usize> {
    if from > text.len() {
        return None;
    }
    text[from..].find(needle).map(|rel| from + rel)
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn leading_whitespace_start(text: &str, pos: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = pos;
    while i > 0 && bytes[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    i
}

fn read_ident(text: &str, from: usize) -> Option<(String, usize)> {
    let mut end = from;
    for (offset, c) in text[from..].char_indices() {
        if c.is_alphanumeric() || c == '_' || c == '$' {
            end = from + offset + c.len_utf8();
        } else {
            break;
        }
    }

    if end == from {
        None
    } else {
        Some((text[from..end].to_string(), end))
    }
}

#[test]
fn match_brace_loop() {
    let text = r#"<ul><li v-for="item in items" class="row">{{ item }}</li></ul>"#;
    let found = find_loop(text, Dialect::Brace, 0).unwrap();

    assert_eq!(&text[found.span.clone()], r#"<li v-for="item in items" class="row">{{ item }}</li>"#);
    assert_eq!(
        found.directive,
        Directive::Loop {
            item: "item".to_string(),
            source: "items".to_string(),
            open: r#"<li class="row">"#.to_string(),
            body: "{{ item }}".to_string(),
            close: "</li>".to_string(),
        }
    );
}

#[test]
fn match_brace_loop_with_nested_same_tag() {
    let text = r#"<tr v-for="r in rows"><td><tr>inner</tr></td></tr><tr>after</tr>"#;
    let found = find_loop(text, Dialect::Brace, 0).unwrap();

    assert_eq!(
        &text[found.span.clone()],
        r#"<tr v-for="r in rows"><td><tr>inner</tr></td></tr>"#
    );
}

#[test]
fn match_bracket_loop() {
    let text = "<tbody>{lineItems.map(lineItem => (<tr><td>{lineItem.item}</td></tr>))}</tbody>";
    let found = find_loop(text, Dialect::Bracket, 0).unwrap();

    assert_eq!(
        found.directive,
        Directive::Loop {
            item: "lineItem".to_string(),
            source: "lineItems".to_string(),
            open: String::new(),
            body: "<tr><td>{lineItem.item}</td></tr>".to_string(),
            close: String::new(),
        }
    );
    assert_eq!(&text[..found.span.start], "<tbody>");
    assert_eq!(&text[found.span.end..], "</tbody>");
}

#[test]
fn match_v_if_strips_marker_from_open_tag() {
    let text = r#"<div v-if="showHeader" class="header"><p>hi</p></div>"#;
    let found = find_if(text, Dialect::Brace, 0).unwrap();

    assert_eq!(
        found.directive,
        Directive::Conditional {
            condition: "showHeader".to_string(),
            open: r#"<div class="header">"#.to_string(),
            body: "<p>hi</p>".to_string(),
            close: "</div>".to_string(),
            kind: ConditionalKind::If,
        }
    );
}

#[test]
fn match_inline_conditional() {
    let text = "<p>{paid && <b>settled</b>}</p>";
    let found = find_if(text, Dialect::Bracket, 0).unwrap();

    assert_eq!(
        found.directive,
        Directive::Conditional {
            condition: "paid".to_string(),
            open: String::new(),
            body: "<b>settled</b>".to_string(),
            close: String::new(),
            kind: ConditionalKind::Inline,
        }
    );
}

#[test]
fn match_class_binding_variants() {
    let brace = r#"<div :class="{ active: isActive }">x</div>"#;
    let found = find_binding(brace, Dialect::Brace, 0).unwrap();
    assert_eq!(
        found.directive,
        Directive::Binding {
            kind: BindingKind::Class,
            expr: "{ active: isActive }".to_string(),
        }
    );
    // Span swallows the leading whitespace so the replacement re-adds one.
    assert_eq!(&brace[found.span.clone()], r#" :class="{ active: isActive }""#);

    let bracket = r#"<div className={highlight}>x</div>"#;
    let found = find_binding(bracket, Dialect::Bracket, 0).unwrap();
    assert_eq!(
        found.directive,
        Directive::Binding {
            kind: BindingKind::Class,
            expr: "highlight".to_string(),
        }
    );

    let style = r#"<div v-bind:style="styles">x</div>"#;
    let found = find_binding(style, Dialect::Brace, 0).unwrap();
    assert_eq!(
        found.directive,
        Directive::Binding {
            kind: BindingKind::Style,
            expr: "styles".to_string(),
        }
    );
}

#[test]
fn match_interpolations() {
    let found = find_interpolation("<div>{{ name }}</div>", Dialect::Brace, 0).unwrap();
    assert_eq!(
        found.directive,
        Directive::Interpolation {
            expr: "name".to_string()
        }
    );

    let found = find_interpolation("<div>{name}</div>", Dialect::Bracket, 0).unwrap();
    assert_eq!(
        found.directive,
        Directive::Interpolation {
            expr: "name".to_string()
        }
    );
    assert_eq!(find_interpolation("no directives", Dialect::Bracket, 0), None);
}

#[test]
fn directives_iterator_orders_families_and_skips_claimed_spans() {
    let text = r#"<li v-for="i in xs">{{ i }}</li><p v-if="ok">{{ name }}</p>{{ top }}"#;
    let kinds: Vec<&str> = Directives::new(text, Dialect::Brace)
        .map(|m| match m.directive {
            Directive::Loop { .. } => "loop",
            Directive::Conditional { .. } => "cond",
            Directive::Binding { .. } => "bind",
            Directive::Interpolation { .. } => "interp",
        })
        .collect();

    // The loop and conditional own their bodies; only the trailing
    // interpolation is free-standing.
    assert_eq!(kinds, vec!["loop", "cond", "interp"]);
}

#[test]
fn self_closing_loop_element_has_empty_body() {
    let text = r#"<input v-for="f in fields" type="text" />"#;
    let found = find_loop(text, Dialect::Brace, 0).unwrap();

    match found.directive {
        Directive::Loop { open, body, close, .. } => {
            assert_eq!(open, r#"<input type="text" />"#);
            assert_eq!(body, "");
            assert_eq!(close, "");
        }
        other => panic!("expected a loop, got {:?}", other),
    }
}

#[test]
fn v_for_without_in_is_not_a_loop() {
    let text = r#"<li v-for="broken">x</li>"#;
    assert_eq!(find_loop(text, Dialect::Brace, 0), None);
}
