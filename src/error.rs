use thiserror::Error;

/// Failure while parsing or evaluating a single template expression.
///
/// These never abort a render on their own; the renderer decides the
/// substitution policy for the span that failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("malformed expression '{expr}': {message}")]
    Syntax { expr: String, message: String },

    #[error("'{name}' is not defined in the context")]
    UndefinedReference { name: String },

    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },
}

/// Failure of a whole render call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("directive nesting exceeded the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("template '{name}' is not registered")]
    TemplateNotFound { name: String },

    #[error("template '{name}' is already registered")]
    DuplicateTemplate { name: String },
}

impl EvalError {
    pub fn syntax(expr: &str, message: impl Into<String>) -> EvalError {
        EvalError::Syntax {
            expr: expr.to_string(),
            message: message.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> EvalError {
        EvalError::TypeMismatch {
            message: message.into(),
        }
    }
}
