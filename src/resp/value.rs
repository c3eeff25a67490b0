use std::fmt;

/// A decoded reply from the service under test.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    SimpleString(String),
    Error(String),
    Integer(i64),
    Double(f64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::SimpleString("PONG".to_string())
    }

    pub fn null() -> Self {
        Reply::BulkString(None)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(format!("ERR {}", msg.into()))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Reply::BulkString(Some(s.into().into_bytes()))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::SimpleString(s) if s == "OK")
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Text form of simple and bulk strings, used when comparing against
    /// string expectations.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Reply::SimpleString(s) => Some(s.clone()),
            Reply::BulkString(Some(data)) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::SimpleString(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "{}", s),
            Reply::Integer(n) => write!(f, "{}", n),
            Reply::Double(n) => write!(f, "{}", n),
            Reply::BulkString(None) | Reply::Array(None) => write!(f, "<nil>"),
            Reply::BulkString(Some(data)) => write!(f, "{}", String::from_utf8_lossy(data)),
            Reply::Array(Some(items)) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<redis::Value> for Reply {
    fn from(value: redis::Value) -> Self {
        match value {
            redis::Value::Nil => Reply::null(),
            redis::Value::Okay => Reply::ok(),
            redis::Value::Int(n) => Reply::Integer(n),
            redis::Value::Double(n) => Reply::Double(n),
            redis::Value::Boolean(b) => Reply::Integer(if b { 1 } else { 0 }),
            redis::Value::SimpleString(s) => Reply::SimpleString(s),
            redis::Value::BulkString(data) => Reply::BulkString(Some(data)),
            redis::Value::Array(items) | redis::Value::Set(items) => {
                Reply::Array(Some(items.into_iter().map(Reply::from).collect()))
            }
            redis::Value::Map(pairs) => Reply::Array(Some(
                pairs
                    .into_iter()
                    .flat_map(|(k, v)| [Reply::from(k), Reply::from(v)])
                    .collect(),
            )),
            other => Reply::from_string(format!("{:?}", other)),
        }
    }
}
