//! Values carried in pi-thread environments and across channels

use crate::channel::ChannelRef;
use pithread_core::{pi_err, ErrorKind, PiResult};
use std::fmt;
use std::sync::Arc;

/// A tagged runtime value
///
/// Only the shapes the scheduler itself needs are here; richer data is
/// the business of the code that generates procedures.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    NoValue,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Channel(ChannelRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::NoValue => "novalue",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Channel(_) => "channel",
        }
    }

    #[inline]
    pub fn is_channel(&self) -> bool {
        matches!(self, Value::Channel(_))
    }

    pub fn as_int(&self) -> PiResult<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(pi_err!(ErrorKind::Contract, "expected int, found {}", other.type_name())),
        }
    }

    pub fn as_bool(&self) -> PiResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(pi_err!(ErrorKind::Contract, "expected bool, found {}", other.type_name())),
        }
    }

    pub fn as_str(&self) -> PiResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(pi_err!(ErrorKind::Contract, "expected string, found {}", other.type_name())),
        }
    }

    pub fn as_channel(&self) -> PiResult<&ChannelRef> {
        match self {
            Value::Channel(ch) => Ok(ch),
            other => Err(pi_err!(ErrorKind::Contract, "expected channel, found {}", other.type_name())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::NoValue, Value::NoValue) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Channel(a), Value::Channel(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::NoValue => write!(f, "NoValue"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Channel(ch) => write!(f, "Channel({})", ch.id()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::NoValue => write!(f, "<novalue>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Channel(ch) => write!(f, "<{}>", ch.id()),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<ChannelRef> for Value {
    fn from(ch: ChannelRef) -> Self {
        Value::Channel(ch)
    }
}
