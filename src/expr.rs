use crate::error::EvalError;

#[derive(PartialEq, Debug, Clone)]
pub enum Token {
    Number(i64),
    Decimal(f64),
    Literal(String),
    // Name that will be looked up in the render context.
    Ident(String),
    True,
    False,
    Null,
    Not,        // !
    And,        // &&
    Or,         // ||
    Equal,      // ==
    NotEqual,   // !=
    Less,       // <
    LessEq,     // <=
    Greater,    // >
    GreaterEq,  // >=
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    Percent,    // %
    Question,   // ?
    Colon,      // :
    Dot,        // .
    Comma,      // ,
    ParenOpen,  // (
    ParenClose, // )
    BracketOpen,  // [
    BracketClose, // ]
    BraceOpen,  // {
    BraceClose, // }
    Arrow,      // =>
}

#[derive(PartialEq, Debug)]
pub struct Tokens {
    pub list: Vec<Token>,
}

impl Tokens {
    pub fn tokenize(text: &str) -> Result<Tokens, EvalError> {
        let chars: Vec<char> = text.chars().collect();
        let mut list = Vec::new();
        let mut current = 0;

        while current < chars.len() {
            let c = chars[current];

            if c.is_whitespace() {
                current += 1;
                continue;
            }

            if c == '"' || c == '\'' {
                let (literal, end) = read_string_literal(text, &chars, current)?;
                list.push(Token::Literal(literal));
                current = end;
                continue;
            }

            if c.is_ascii_digit() {
                let (token, end) = read_number(text, &chars, current)?;
                list.push(token);
                current = end;
                continue;
            }

            if c.is_alphabetic() || c == '_' || c == '$' {
                let (token, end) = read_ident(&chars, current);
                list.push(token);
                current = end;
                continue;
            }

            // Two-character operators first so "<=" never lexes as "<", "=".
            if current + 1 < chars.len() {
                if let Some(token) = check_double_op(c, chars[current + 1]) {
                    list.push(token);
                    current += 2;
                    continue;
                }
            }

            let token = match c {
                '!' => Token::Not,
                '<' => Token::Less,
                '>' => Token::Greater,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '?' => Token::Question,
                ':' => Token::Colon,
                '.' => Token::Dot,
                ',' => Token::Comma,
                '(' => Token::ParenOpen,
                ')' => Token::ParenClose,
                '[' => Token::BracketOpen,
                ']' => Token::BracketClose,
                '{' => Token::BraceOpen,
                '}' => Token::BraceClose,
                _ => {
                    return Err(EvalError::syntax(
                        text,
                        format!("unexpected character '{}'", c),
                    ));
                }
            };

            list.push(token);
            current += 1;
        }

        Ok(Tokens { list })
    }
}

fn check_double_op(first: char, second: char) -> Option<Token> {
    match (first, second) {
        ('&', '&') => Some(Token::And),
        ('|', '|') => Some(Token::Or),
        ('=', '=') => Some(Token::Equal),
        ('!', '=') => Some(Token::NotEqual),
        ('<', '=') => Some(Token::LessEq),
        ('>', '=') => Some(Token::GreaterEq),
        ('=', '>') => Some(Token::Arrow),
        _ => None,
    }
}

// Returns the unescaped literal and the index just past the closing quote.
fn read_string_literal(
    text: &str,
    chars: &[char],
    start: usize,
) -> Result<(String, usize), EvalError> {
    let quote = chars[start];
    let mut literal = String::new();
    let mut current = start + 1;

    while current < chars.len() {
        match chars[current] {
            '\\' if current + 1 < chars.len() => {
                literal.push(chars[current + 1]);
                current += 2;
            }
            c if c == quote => return Ok((literal, current + 1)),
            c => {
                literal.push(c);
                current += 1;
            }
        }
    }

    Err(EvalError::syntax(text, "unterminated string literal"))
}

fn read_number(text: &str, chars: &[char], start: usize) -> Result<(Token, usize), EvalError> {
    let mut current = start;
    let mut has_dot = false;

    while current < chars.len() {
        let c = chars[current];
        if c.is_ascii_digit() {
            current += 1;
        } else if c == '.' && !has_dot && chars.get(current + 1).is_some_and(|n| n.is_ascii_digit())
        {
            has_dot = true;
            current += 1;
        } else {
            break;
        }
    }

    let digits: String = chars[start..current].iter().collect();
    let token = if has_dot {
        match digits.parse() {
            Ok(n) => Token::Decimal(n),
            Err(_) => return Err(EvalError::syntax(text, format!("bad number '{}'", digits))),
        }
    } else {
        match digits.parse() {
            Ok(n) => Token::Number(n),
            Err(_) => return Err(EvalError::syntax(text, format!("bad number '{}'", digits))),
        }
    };

    Ok((token, current))
}

fn read_ident(chars: &[char], start: usize) -> (Token, usize) {
    let mut current = start;
    while current < chars.len()
        && (chars[current].is_alphanumeric() || chars[current] == '_' || chars[current] == '$')
    {
        current += 1;
    }

    let name: String = chars[start..current].iter().collect();
    let token = match name.as_str() {
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => Token::Ident(name),
    };

    (token, current)
}

#[test]
fn tokenize_simple_comparison() {
    let result = Tokens::tokenize("some == 3");

    let expected = Tokens {
        list: vec![
            Token::Ident("some".to_string()),
            Token::Equal,
            Token::Number(3),
        ],
    };
    assert_eq!(result.unwrap(), expected);
}

#[test]
fn tokenize_property_path() {
    let result = Tokens::tokenize("company.name");

    let expected = Tokens {
        list: vec![
            Token::Ident("company".to_string()),
            Token::Dot,
            Token::Ident("name".to_string()),
        ],
    };
    assert_eq!(result.unwrap(), expected);
}

#[test]
fn tokenize_string_literal_with_escape() {
    let result = Tokens::tokenize(r#"name == "a\"bc""#);

    let expected = Tokens {
        list: vec![
            Token::Ident("name".to_string()),
            Token::Equal,
            Token::Literal("a\"bc".to_string()),
        ],
    };
    assert_eq!(result.unwrap(), expected);
}

#[test]
fn tokenize_single_quoted_literal() {
    let result = Tokens::tokenize("'paid'");

    assert_eq!(
        result.unwrap(),
        Tokens {
            list: vec![Token::Literal("paid".to_string())]
        }
    );
}

#[test]
fn tokenize_arrow_and_map() {
    let result = Tokens::tokenize("items.map(item => item.total)");

    let expected = Tokens {
        list: vec![
            Token::Ident("items".to_string()),
            Token::Dot,
            Token::Ident("map".to_string()),
            Token::ParenOpen,
            Token::Ident("item".to_string()),
            Token::Arrow,
            Token::Ident("item".to_string()),
            Token::Dot,
            Token::Ident("total".to_string()),
            Token::ParenClose,
        ],
    };
    assert_eq!(result.unwrap(), expected);
}

#[test]
fn tokenize_ternary() {
    let result = Tokens::tokenize("paid ? 'yes' : 'no'");

    let expected = Tokens {
        list: vec![
            Token::Ident("paid".to_string()),
            Token::Question,
            Token::Literal("yes".to_string()),
            Token::Colon,
            Token::Literal("no".to_string()),
        ],
    };
    assert_eq!(result.unwrap(), expected);
}

#[test]
fn tokenize_decimal_and_member_digit() {
    assert_eq!(
        Tokens::tokenize("1.5").unwrap(),
        Tokens {
            list: vec![Token::Decimal(1.5)]
        }
    );
    // A trailing dot stays a member access, not a malformed number.
    assert_eq!(
        Tokens::tokenize("a.b").unwrap().list.len(),
        3
    );
}

#[test]
fn tokenize_rejects_unknown_character() {
    assert!(Tokens::tokenize("a # b").is_err());
    assert!(Tokens::tokenize("\"unterminated").is_err());
}

#[test]
fn tokenize_object_literal() {
    let result = Tokens::tokenize("{ active: true }");

    let expected = Tokens {
        list: vec![
            Token::BraceOpen,
            Token::Ident("active".to_string()),
            Token::Colon,
            Token::True,
            Token::BraceClose,
        ],
    };
    assert_eq!(result.unwrap(), expected);
}

#[test]
fn tokenize_complex_condition() {
    let result = Tokens::tokenize("!hidden && (total >= 100 || vip)");

    let expected = Tokens {
        list: vec![
            Token::Not,
            Token::Ident("hidden".to_string()),
            Token::And,
            Token::ParenOpen,
            Token::Ident("total".to_string()),
            Token::GreaterEq,
            Token::Number(100),
            Token::Or,
            Token::Ident("vip".to_string()),
            Token::ParenClose,
        ],
    };
    assert_eq!(result.unwrap(), expected);
}
