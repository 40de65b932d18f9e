//! Scalar function descriptors.
//!
//! A [`ScalarFunction`] pairs a [`Signature`] with the Rust closure that
//! implements it. The binder picks one overload per call site and stores an
//! `Arc` to it in [`BoundExpr::Call`](super::BoundExpr::Call).

use std::fmt;
use std::sync::Arc;

use crate::datum::{Type, Value};

use super::error::ExecutorError;

/// Declared type of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Exactly this type (after implicit conversion).
    Exact(Type),
    /// Any type; the argument is passed through unconverted.
    Any,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Exact(ty) => write!(f, "{}", ty.display_name()),
            ParamType::Any => write!(f, "ANY"),
        }
    }
}

/// How a function's result type is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// Always this type.
    Fixed(Type),
    /// The common type of all arguments (e.g. `Coalesce`).
    CommonArgument,
}

/// Name, parameters and result type of a function overload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Function name as registered.
    pub name: String,
    /// Fixed parameters.
    pub params: Vec<ParamType>,
    /// Type of any number of trailing arguments.
    pub variadic: Option<ParamType>,
    /// Result type rule.
    pub returns: ReturnType,
}

impl Signature {
    /// Creates a signature with fixed parameters and a fixed result type.
    pub fn new(name: impl Into<String>, params: Vec<Type>, returns: Type) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().map(ParamType::Exact).collect(),
            variadic: None,
            returns: ReturnType::Fixed(returns),
        }
    }

    /// Returns the declared type of argument `i`, or `None` past the end of
    /// a non-variadic signature.
    pub fn param(&self, i: usize) -> Option<ParamType> {
        self.params.get(i).copied().or(self.variadic)
    }

    /// Returns true if the signature accepts `n` arguments.
    pub fn accepts_arity(&self, n: usize) -> bool {
        match self.variadic {
            Some(_) => n >= self.params.len(),
            None => n == self.params.len(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        if let Some(v) = self.variadic {
            params.push(format!("{}...", v));
        }
        write!(f, "{}({})", self.name, params.join(", "))?;
        match self.returns {
            ReturnType::Fixed(ty) => write!(f, " -> {}", ty.display_name()),
            ReturnType::CommonArgument => write!(f, " -> ANY"),
        }
    }
}

type ScalarImpl = Arc<dyn Fn(&[Value]) -> Result<Value, ExecutorError> + Send + Sync>;

/// An invocable scalar function overload.
pub struct ScalarFunction {
    signature: Signature,
    null_propagating: bool,
    body: ScalarImpl,
}

impl ScalarFunction {
    /// Creates a function that returns NULL whenever any argument is NULL,
    /// without calling `body`.
    pub fn new<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ExecutorError> + Send + Sync + 'static,
    {
        Self {
            signature,
            null_propagating: true,
            body: Arc::new(body),
        }
    }

    /// Creates a function whose body sees NULL arguments.
    pub fn null_aware<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ExecutorError> + Send + Sync + 'static,
    {
        Self {
            signature,
            null_propagating: false,
            body: Arc::new(body),
        }
    }

    /// The overload's signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Calls the function with already-converted arguments.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, ExecutorError> {
        if self.null_propagating && args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }
        (self.body)(args)
    }

    /// Whether a NULL result is possible even for non-NULL arguments.
    pub(crate) fn null_propagating(&self) -> bool {
        self.null_propagating
    }
}

impl fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScalarFunction({})", self.signature)
    }
}

impl PartialEq for ScalarFunction {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}
