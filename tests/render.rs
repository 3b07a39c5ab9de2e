use serde_json::json;
use vellum::{render, render_with, Context, Dialect, RenderError, RenderOptions};

#[test]
fn vue_invoice_end_to_end() {
    let template = r#"<div class="invoice">
  <div v-if="showHeader" class="header"><p>Company: {{ company.name }}</p></div>
  <table><tbody><tr v-for="lineItem in lineItems"><td>{{ lineItem.item }}</td><td>{{ lineItem.total }}</td></tr></tbody></table>
  <div class="total" v-show="showTotal"><p>Grand Total: {{ grandTotal }}</p></div>
</div>"#;

    let context = Context::new(json!({
        "showHeader": true,
        "showTotal": true,
        "company": { "name": "Acme Corp" },
        "grandTotal": "$1,219.00",
        "lineItems": [
            { "item": "Surf Board", "total": "$1,060.00" },
            { "item": "Board Wax", "total": "$159.00" }
        ]
    }));

    let expected = r#"<div class="invoice">
  <div class="header"><p>Company: Acme Corp</p></div>
  <table><tbody><tr><td>Surf Board</td><td>$1,060.00</td></tr><tr><td>Board Wax</td><td>$159.00</td></tr></tbody></table>
  <div class="total"><p>Grand Total: $1,219.00</p></div>
</div>"#;

    assert_eq!(render(template, &context, Dialect::Brace).unwrap(), expected);
}

#[test]
fn vue_invoice_hides_header_and_total() {
    let template = r#"<div v-if="showHeader"><p>Header</p></div><div class="total" v-show="showTotal">Sum</div>"#;

    let context = Context::new(json!({ "showHeader": false, "showTotal": false }));

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        r#"<div class="total" style="display: none;">Sum</div>"#
    );
}

#[test]
fn jsx_line_items_end_to_end() {
    let template = r#"<div>{showNote && <p class="note">{note}</p>}</div><ul>{items.map(item => (<li>{item.name}: {'$' + item.price}</li>))}</ul>"#;

    let context = Context::new(json!({
        "showNote": true,
        "note": "Thanks!",
        "items": [
            { "name": "Surf Board", "price": 1000 },
            { "name": "Board Wax", "price": 75 }
        ]
    }));

    assert_eq!(
        render(template, &context, Dialect::Bracket).unwrap(),
        r#"<div><p class="note">Thanks!</p></div><ul><li>Surf Board: $1000</li><li>Board Wax: $75</li></ul>"#
    );
}

#[test]
fn plain_literal_templates_are_identity() {
    let template = "<html><body><h1>Invoice</h1></body></html>";
    let context = Context::new(json!({ "anything": [1, 2, 3] }));

    for dialect in [Dialect::Bracket, Dialect::Brace] {
        assert_eq!(render(template, &context, dialect).unwrap(), template);
    }
}

#[test]
fn rendering_is_idempotent_on_rendered_output() {
    let template = r#"<ul><li v-for="i in items">{{ i }}</li></ul>"#;
    let context = Context::new(json!({ "items": ["a", "b"] }));

    let once = render(template, &context, Dialect::Brace).unwrap();
    assert_eq!(render(&once, &context, Dialect::Brace).unwrap(), once);
}

#[test]
fn loop_count_matches_array_length() {
    let template = r#"<td v-for="item in items">{{ item }}</td>"#;

    let context = Context::new(json!({ "items": ["one", "two"] }));
    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        "<td>one</td><td>two</td>"
    );

    let empty = Context::new(json!({ "items": [] }));
    assert_eq!(render(template, &empty, Dialect::Brace).unwrap(), "");
}

#[test]
fn class_binding_object_form() {
    let template = r#"<div :class="{ active: active, hidden: hidden }">x</div>"#;
    let context = Context::new(json!({ "active": true, "hidden": false }));

    assert_eq!(
        render(template, &context, Dialect::Brace).unwrap(),
        r#"<div class="active">x</div>"#
    );
}

#[test]
fn undefined_reference_degrades_not_crashes() {
    let context = Context::new(json!({}));

    assert_eq!(render("{missing}", &context, Dialect::Bracket).unwrap(), "");
    assert_eq!(
        render("{{ missing.deep.path }}", &context, Dialect::Brace).unwrap(),
        ""
    );
}

#[test]
fn adversarial_nesting_fails_with_depth_error() {
    // Each level re-enters the renderer; past the limit the whole render
    // call fails instead of overflowing the stack.
    let mut template = "{{ x }}".to_string();
    for _ in 0..12 {
        template = format!(r#"<li v-for="x in xs">{}</li>"#, template);
    }
    let context = Context::new(json!({ "xs": [1] }));
    let options = RenderOptions {
        max_depth: 8,
        ..RenderOptions::default()
    };

    assert_eq!(
        render_with(&template, &context, Dialect::Brace, &options),
        Err(RenderError::DepthExceeded { limit: 8 })
    );
}
