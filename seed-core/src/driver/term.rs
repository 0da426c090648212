//! The index-function term language the bundled drivers understand.
//!
//! ```text
//! {"field": "a"}                        row("a")
//! {"add": [{"field": "a"}, ...]}        row("a").add(...)
//! {"literal": 3}                        3
//! ```

use serde_json::{Number, Value};

use crate::{
  error::{DriverError, ErrorKind},
  schema::IndexFunction,
  validate::type_name,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Term {
  Field(String),
  Add(Vec<Term>),
  Literal(Value),
}

fn compile_error(msg: String) -> DriverError {
  DriverError::new(ErrorKind::Compile, msg)
}

pub fn compile(function: &IndexFunction) -> Result<Term, DriverError> {
  compile_term(function.term())
}

fn compile_term(value: &Value) -> Result<Term, DriverError> {
  let obj = value.as_object().ok_or_else(|| {
    compile_error(format!(
      "Expected a term object in index function but found {}.",
      type_name(value)
    ))
  })?;
  let (op, arg) = match obj.iter().next() {
    Some(x) if obj.len() == 1 => x,
    _ => {
      return Err(compile_error(format!(
        "Expected exactly one operation per term in index function but found {}.",
        obj.len()
      )))
    }
  };
  match op.as_str() {
    "field" => match arg {
      Value::String(x) => Ok(Term::Field(x.clone())),
      _ => Err(compile_error(format!(
        "Expected a field name for `field` but found {}.",
        type_name(arg)
      ))),
    },
    "add" => match arg {
      Value::Array(args) if !args.is_empty() => Ok(Term::Add(
        args.iter().map(compile_term).collect::<Result<_, _>>()?,
      )),
      _ => Err(compile_error(
        "Expected a non-empty argument array for `add`.".to_string(),
      )),
    },
    "literal" => Ok(Term::Literal(arg.clone())),
    _ => Err(compile_error(format!(
      "Unrecognized operation `{}` in index function.",
      op
    ))),
  }
}

impl Term {
  /// Evaluates against one row. `None` means the row is left out of the
  /// index, the way a row whose index function errors is.
  pub fn eval(&self, row: &Value) -> Option<Value> {
    match self {
      Self::Field(name) => row.get(name).cloned(),
      Self::Literal(x) => Some(x.clone()),
      Self::Add(args) => {
        let values = args
          .iter()
          .map(|x| x.eval(row))
          .collect::<Option<Vec<_>>>()?;
        if values.iter().all(|x| x.is_i64()) {
          let sum = values
            .iter()
            .try_fold(0i64, |acc, x| acc.checked_add(x.as_i64()?))?;
          Some(Value::Number(sum.into()))
        } else {
          let sum = values
            .iter()
            .map(|x| x.as_f64())
            .sum::<Option<f64>>()?;
          Number::from_f64(sum).map(Value::Number)
        }
      }
    }
  }
}
