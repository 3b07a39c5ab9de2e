use crate::context::{
    compute_binary, compute_unary, type_name, value_to_boolean, BinaryOp, Context, UnaryOp,
};
use crate::error::EvalError;
use crate::expr::{Token, Tokens};
use serde_json::Value;

/// A parsed expression in the restricted template dialect.
///
/// The grammar covers property access, indexing, arithmetic, comparisons,
/// boolean logic, the ternary operator and `.map(x => expr)` over arrays.
/// There are no statements, no assignment and no function calls, so an
/// expression can only read from the supplied context.
#[derive(PartialEq, Debug)]
pub struct Eval {
    ast: Ast,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Ast {
    Literal(Value),
    Ref(String),
    Member(Box<Ast>, String),
    Index(Box<Ast>, Box<Ast>),
    Unary(UnaryOp, Box<Ast>),
    Binary(BinaryOp, Box<Ast>, Box<Ast>),
    Ternary(Box<Ast>, Box<Ast>, Box<Ast>),
    Map {
        source: Box<Ast>,
        item: String,
        body: Box<Ast>,
    },
    // `{ key: expr, .. }` and `[expr, ..]`, the forms class/style bindings
    // are written in.
    ObjectLit(Vec<(String, Ast)>),
    ArrayLit(Vec<Ast>),
}

/// Parses and evaluates `expr` against `context` in one step.
pub fn evaluate(expr: &str, context: &Context) -> Result<Value, EvalError> {
    Eval::parse(expr)?.run(context)
}

impl Eval {
    pub fn parse(expr: &str) -> Result<Eval, EvalError> {
        let tokens = Tokens::tokenize(expr)?;
        let mut parser = AstParser {
            tokens: tokens.list,
            pos: 0,
        };

        let ast = parser.ternary().map_err(|message| EvalError::syntax(expr, message))?;
        if parser.pos != parser.tokens.len() {
            return Err(EvalError::syntax(expr, "unexpected trailing tokens"));
        }

        Ok(Eval { ast })
    }

    pub fn run(&self, context: &Context) -> Result<Value, EvalError> {
        eval_ast(&self.ast, context)
    }
}

struct AstParser {
    tokens: Vec<Token>,
    pos: usize,
}

// Recursive descent, one level per precedence tier. Each tier parses its
// higher-priority sub-expression first and then folds same-tier operators
// left to right.
impl AstParser {
    fn ternary(&mut self) -> Result<Ast, String> {
        let cond = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }

        let when_true = self.ternary()?;
        self.expect(&Token::Colon, "':' in ternary")?;
        let when_false = self.ternary()?;

        Ok(Ast::Ternary(
            Box::new(cond),
            Box::new(when_true),
            Box::new(when_false),
        ))
    }

    fn or(&mut self) -> Result<Ast, String> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Ast::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Ast, String> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = Ast::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Ast, String> {
        let mut left = self.compare()?;
        loop {
            let op = match self.peek() {
                Some(Token::Equal) => BinaryOp::Equal,
                Some(Token::NotEqual) => BinaryOp::NotEqual,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.compare()?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn compare(&mut self) -> Result<Ast, String> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Less) => BinaryOp::Less,
                Some(Token::LessEq) => BinaryOp::LessEq,
                Some(Token::Greater) => BinaryOp::Greater,
                Some(Token::GreaterEq) => BinaryOp::GreaterEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> Result<Ast, String> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Ast, String> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                Some(Token::Percent) => BinaryOp::Modulo,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Ast::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Ast, String> {
        if self.eat(&Token::Not) {
            return Ok(Ast::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Ast::Unary(UnaryOp::Negate, Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Ast, String> {
        let mut base = self.primary()?;

        loop {
            if self.eat(&Token::Dot) {
                let name = match self.next() {
                    Some(Token::Ident(name)) => name,
                    _ => return Err("expected a property name after '.'".to_string()),
                };

                if self.peek() == Some(&Token::ParenOpen) {
                    if name != "map" {
                        return Err(format!("function calls are not supported: '{}()'", name));
                    }
                    base = self.map_call(base)?;
                } else {
                    base = Ast::Member(Box::new(base), name);
                }
            } else if self.eat(&Token::BracketOpen) {
                let index = self.ternary()?;
                self.expect(&Token::BracketClose, "']' after index")?;
                base = Ast::Index(Box::new(base), Box::new(index));
            } else {
                return Ok(base);
            }
        }
    }

    // source.map(item => body), the one permitted call form.
    fn map_call(&mut self, source: Ast) -> Result<Ast, String> {
        self.expect(&Token::ParenOpen, "'(' after map")?;
        let item = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err("map() expects a single parameter name".to_string()),
        };
        self.expect(&Token::Arrow, "'=>' in map lambda")?;
        let body = self.ternary()?;
        self.expect(&Token::ParenClose, "')' closing map")?;

        Ok(Ast::Map {
            source: Box::new(source),
            item,
            body: Box::new(body),
        })
    }

    fn primary(&mut self) -> Result<Ast, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Ast::Literal(Value::from(n))),
            Some(Token::Decimal(n)) => Ok(Ast::Literal(Value::from(n))),
            Some(Token::Literal(s)) => Ok(Ast::Literal(Value::from(s))),
            Some(Token::True) => Ok(Ast::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Ast::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Ast::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Ast::Ref(name)),
            Some(Token::ParenOpen) => {
                let inner = self.ternary()?;
                self.expect(&Token::ParenClose, "closing ')'")?;
                Ok(inner)
            }
            Some(Token::BraceOpen) => self.object_literal(),
            Some(Token::BracketOpen) => self.array_literal(),
            Some(token) => Err(format!("expected a value, found {:?}", token)),
            None => Err("expression ended unexpectedly".to_string()),
        }
    }

    // `{ key: expr, .. }`; keys are bare identifiers or string literals and
    // keep their written order.
    fn object_literal(&mut self) -> Result<Ast, String> {
        let mut entries = Vec::new();

        while !self.eat(&Token::BraceClose) {
            let key = match self.next() {
                Some(Token::Ident(name)) => name,
                Some(Token::Literal(s)) => s,
                _ => return Err("expected a key in object literal".to_string()),
            };
            self.expect(&Token::Colon, "':' after object key")?;
            entries.push((key, self.ternary()?));

            if !self.eat(&Token::Comma) {
                self.expect(&Token::BraceClose, "'}' closing object literal")?;
                break;
            }
        }

        Ok(Ast::ObjectLit(entries))
    }

    fn array_literal(&mut self) -> Result<Ast, String> {
        let mut entries = Vec::new();

        while !self.eat(&Token::BracketClose) {
            entries.push(self.ternary()?);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::BracketClose, "']' closing array literal")?;
                break;
            }
        }

        Ok(Ast::ArrayLit(entries))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected {}", what))
        }
    }
}

fn eval_ast(ast: &Ast, context: &Context) -> Result<Value, EvalError> {
    match ast {
        Ast::Literal(v) => Ok(v.clone()),
        Ast::Ref(name) => match context.get(name) {
            Some(v) => Ok(v.clone()),
            None => Err(EvalError::UndefinedReference { name: name.clone() }),
        },
        Ast::Member(base, name) => {
            let value = eval_ast(base, context)?;
            match &value {
                Value::Object(map) => match map.get(name) {
                    Some(v) => Ok(v.clone()),
                    None => Err(EvalError::UndefinedReference {
                        name: reference_path(ast),
                    }),
                },
                Value::Array(arr) if name == "length" => Ok(Value::from(arr.len())),
                Value::String(s) if name == "length" => Ok(Value::from(s.chars().count())),
                v => Err(EvalError::type_mismatch(format!(
                    "cannot read property '{}' of {}",
                    name,
                    type_name(v)
                ))),
            }
        }
        Ast::Index(base, index) => {
            let value = eval_ast(base, context)?;
            let index = eval_ast(index, context)?;
            match (&value, &index) {
                (Value::Array(arr), Value::Number(n)) => match n.as_u64() {
                    Some(i) => match arr.get(i as usize) {
                        Some(v) => Ok(v.clone()),
                        None => Err(EvalError::UndefinedReference {
                            name: format!("{}[{}]", reference_path(base), i),
                        }),
                    },
                    None => Err(EvalError::type_mismatch(format!(
                        "array index must be a non-negative integer, got {}",
                        n
                    ))),
                },
                (Value::Object(map), Value::String(key)) => match map.get(key) {
                    Some(v) => Ok(v.clone()),
                    None => Err(EvalError::UndefinedReference {
                        name: format!("{}[\"{}\"]", reference_path(base), key),
                    }),
                },
                (v, i) => Err(EvalError::type_mismatch(format!(
                    "cannot index {} with {}",
                    type_name(v),
                    type_name(i)
                ))),
            }
        }
        Ast::Unary(op, operand) => compute_unary(*op, &eval_ast(operand, context)?),
        // Logical operators yield the deciding operand, so `a || 'fallback'`
        // and `user && user.name` behave as in the source dialect.
        Ast::Binary(BinaryOp::And, left, right) => {
            let left = eval_ast(left, context)?;
            if !value_to_boolean(&left) {
                return Ok(left);
            }
            eval_ast(right, context)
        }
        Ast::Binary(BinaryOp::Or, left, right) => {
            let left = eval_ast(left, context)?;
            if value_to_boolean(&left) {
                return Ok(left);
            }
            eval_ast(right, context)
        }
        Ast::Binary(op, left, right) => {
            let left = eval_ast(left, context)?;
            let right = eval_ast(right, context)?;
            compute_binary(*op, &left, &right)
        }
        Ast::Ternary(cond, when_true, when_false) => {
            if value_to_boolean(&eval_ast(cond, context)?) {
                eval_ast(when_true, context)
            } else {
                eval_ast(when_false, context)
            }
        }
        Ast::Map { source, item, body } => match eval_ast(source, context)? {
            Value::Array(arr) => {
                let mut mapped = Vec::with_capacity(arr.len());
                for elem in arr {
                    let scope = context.child(item, elem);
                    mapped.push(eval_ast(body, &scope)?);
                }
                Ok(Value::Array(mapped))
            }
            v => Err(EvalError::type_mismatch(format!(
                "map() needs an array, got {}",
                type_name(&v)
            ))),
        },
        Ast::ObjectLit(entries) => {
            let mut map = serde_json::Map::new();
            for (key, value) in entries {
                map.insert(key.clone(), eval_ast(value, context)?);
            }
            Ok(Value::Object(map))
        }
        Ast::ArrayLit(entries) => {
            let mut items = Vec::with_capacity(entries.len());
            for entry in entries {
                items.push(eval_ast(entry, context)?);
            }
            Ok(Value::Array(items))
        }
    }
}

// Dotted form of a reference chain for error messages; falls back to a
// placeholder for bases that are not plain references.
fn reference_path(ast: &Ast) -> String {
    match ast {
        Ast::Ref(name) => name.clone(),
        Ast::Member(base, name) => format!("{}.{}", reference_path(base), name),
        _ => "<expr>".to_string(),
    }
}

#[cfg(test)]
use serde_json::json;

#[test]
fn parse_member_chain() {
    let eval = Eval::parse("a.b.c").unwrap();

    assert_eq!(
        eval.ast,
        Ast::Member(
            Box::new(Ast::Member(
                Box::new(Ast::Ref("a".to_string())),
                "b".to_string()
            )),
            "c".to_string()
        )
    );
}

#[test]
fn parse_precedence() {
    // 1 + 2 * 3 groups the multiplication first.
    let eval = Eval::parse("1 + 2 * 3").unwrap();

    assert_eq!(
        eval.ast,
        Ast::Binary(
            BinaryOp::Add,
            Box::new(Ast::Literal(Value::from(1))),
            Box::new(Ast::Binary(
                BinaryOp::Multiply,
                Box::new(Ast::Literal(Value::from(2))),
                Box::new(Ast::Literal(Value::from(3))),
            )),
        )
    );
}

#[test]
fn parse_rejects_function_calls() {
    assert!(Eval::parse("alert('x')").is_err());
    assert!(Eval::parse("items.pop()").is_err());
}

#[test]
fn parse_rejects_trailing_tokens() {
    assert!(Eval::parse("a b").is_err());
    assert!(Eval::parse("a ==").is_err());
}

#[test]
fn run_property_path() {
    let context = Context::new(json!({ "company": { "name": "Acme Corp" } }));

    assert_eq!(
        evaluate("company.name", &context).unwrap(),
        Value::from("Acme Corp")
    );
}

#[test]
fn run_indexing() {
    let context = Context::new(json!({ "items": ["a", "b"], "key": "x", "obj": {"x": 9} }));

    assert_eq!(evaluate("items[1]", &context).unwrap(), Value::from("b"));
    assert_eq!(evaluate("obj[key]", &context).unwrap(), Value::from(9));
    assert!(matches!(
        evaluate("items[5]", &context),
        Err(EvalError::UndefinedReference { .. })
    ));
}

#[test]
fn run_length_property() {
    let context = Context::new(json!({ "items": [1, 2, 3], "name": "abc" }));

    assert_eq!(evaluate("items.length", &context).unwrap(), Value::from(3));
    assert_eq!(evaluate("name.length", &context).unwrap(), Value::from(3));
}

#[test]
fn run_ternary_and_comparison() {
    let context = Context::new(json!({ "total": 120 }));

    assert_eq!(
        evaluate("total >= 100 ? 'big' : 'small'", &context).unwrap(),
        Value::from("big")
    );
}

#[test]
fn run_logical_yields_operand() {
    let context = Context::new(json!({ "name": "", "user": { "name": "Jo" } }));

    assert_eq!(
        evaluate("name || 'anonymous'", &context).unwrap(),
        Value::from("anonymous")
    );
    assert_eq!(
        evaluate("user && user.name", &context).unwrap(),
        Value::from("Jo")
    );
}

#[test]
fn run_short_circuit_skips_right_side() {
    // user.name would fail on its own; && must not reach it.
    let context = Context::new(json!({ "user": null }));

    assert_eq!(evaluate("user && user.name", &context).unwrap(), Value::Null);
}

#[test]
fn run_map_binds_loop_variable() {
    let context = Context::new(json!({ "items": [{ "n": 1 }, { "n": 2 }] }));

    assert_eq!(
        evaluate("items.map(item => item.n * 10)", &context).unwrap(),
        json!([10, 20])
    );
}

#[test]
fn run_map_scope_shadows_and_restores() {
    let context = Context::new(json!({ "item": "outer", "items": [1, 2] }));

    assert_eq!(
        evaluate("items.map(item => item)", &context).unwrap(),
        json!([1, 2])
    );
    // The outer binding is untouched after the map.
    assert_eq!(evaluate("item", &context).unwrap(), Value::from("outer"));
}

#[test]
fn run_undefined_reference() {
    let context = Context::new(json!({}));

    assert_eq!(
        evaluate("missing", &context),
        Err(EvalError::UndefinedReference {
            name: "missing".to_string()
        })
    );
    let context = Context::new(json!({ "a": { "b": 1 } }));
    assert_eq!(
        evaluate("a.c", &context),
        Err(EvalError::UndefinedReference {
            name: "a.c".to_string()
        })
    );
}

#[test]
fn run_object_literal_keeps_key_order() {
    let context = Context::new(json!({ "isActive": true }));

    let value = evaluate("{ active: isActive, hidden: !isActive }", &context).unwrap();
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["active", "hidden"]);
    assert_eq!(value["active"], Value::Bool(true));
    assert_eq!(value["hidden"], Value::Bool(false));
}

#[test]
fn run_array_literal() {
    let context = Context::new(json!({ "extra": "wide" }));

    assert_eq!(
        evaluate("['row', extra]", &context).unwrap(),
        json!(["row", "wide"])
    );
}

#[test]
fn run_string_concatenation() {
    let context = Context::new(json!({ "total": 42 }));

    assert_eq!(
        evaluate("'$' + total", &context).unwrap(),
        Value::from("$42")
    );
}
