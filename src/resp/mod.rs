mod command;
mod value;

pub use command::{Command, Expect, Expectation};
pub use value::Reply;
