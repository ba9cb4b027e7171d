//! Prepared-statement engine: issues `PREPARE`, splits the returned
//! descriptor rows into result columns and parameters, binds parameter
//! literals, and re-invokes with `exec id(...)`.

use std::sync::{Arc, Mutex, Weak};

use crate::dispatcher;
use crate::error::{ConnectionError, Error, Result};
use crate::literal::{literalize, StringEscapeMode, Value};
use crate::session::Session;
use crate::statement::Statement;

/// One column of the `PREPARE` descriptor: a result column if `column` is
/// `Some`, a parameter placeholder otherwise.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub type_name: String,
    pub digits: i64,
    pub scale: i64,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
}

/// A server-side compiled statement bound to a `Session`.
pub struct PreparedStatement {
    session: Session,
    id: i64,
    closed: Arc<Mutex<bool>>,
    descriptors: Vec<Descriptor>,
    param_start: usize,
    params: Vec<Option<String>>,
    escape: StringEscapeMode,
}

impl PreparedStatement {
    pub(crate) fn prepare(session: &Session, text: &str) -> Result<Self> {
        let (id, _columns, rows) = session.prepare(text)?;
        let descriptors = rows
            .iter()
            .map(parse_descriptor_row)
            .collect::<Result<Vec<_>>>()?;
        let param_start = descriptors
            .iter()
            .position(|d| d.column.is_none())
            .unwrap_or(descriptors.len());
        let param_count = descriptors.len() - param_start;

        let closed = Arc::new(Mutex::new(false));
        session.register_statement(Arc::downgrade(&closed) as Weak<Mutex<bool>>);

        Ok(Self {
            session: session.clone(),
            id,
            closed,
            descriptors,
            param_start,
            params: vec![None; param_count],
            escape: StringEscapeMode { c_style: false },
        })
    }

    /// The result columns this statement will yield, in order (the
    /// descriptor rows before `param_start`).
    pub fn result_columns(&self) -> &[Descriptor] {
        &self.descriptors[..self.param_start]
    }

    /// The parameter placeholders this statement expects, in order.
    pub fn parameters(&self) -> &[Descriptor] {
        &self.descriptors[self.param_start..]
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Selects whether bound string parameters are escaped for a C-style
    /// string server.
    pub fn set_string_escape_mode(&mut self, mode: StringEscapeMode) {
        self.escape = mode;
    }

    fn check_open(&self) -> Result<()> {
        let closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return Err(Error::Connection(ConnectionError::Closed));
        }
        Ok(())
    }

    /// Binds `value` to the 1-based parameter `index`.
    pub fn set_parameter(&mut self, index: usize, value: &Value) -> Result<()> {
        self.check_open()?;
        if index == 0 || index > self.params.len() {
            return Err(Error::api_misuse(format!(
                "parameter index {index} out of range, statement has {} parameters",
                self.params.len()
            )));
        }
        let literal = literalize(value, self.escape)?;
        self.params[index - 1] = Some(literal);
        Ok(())
    }

    /// Builds `exec id(v1,v2,...)` from the bound parameter slots and runs
    /// it like a normal query.
    pub fn execute(&mut self) -> Result<Statement> {
        self.check_open()?;
        let mut args = Vec::with_capacity(self.params.len());
        for (i, slot) in self.params.iter().enumerate() {
            match slot {
                Some(literal) => args.push(literal.clone()),
                None => {
                    return Err(Error::api_misuse(format!(
                        "parameter {} was never set",
                        i + 1
                    )));
                }
            }
        }
        let text = format!("exec {}({})", self.id, args.join(","));
        let cache_size =
            dispatcher::effective_reply_size(0, 0, crate::constant::DEFAULT_REPLY_SIZE);
        let responses = dispatcher::run_query_turn(&self.session, &text, cache_size)?;
        Ok(Statement::from_responses(&self.session, responses))
    }

    /// `Xrelease id`, idempotent after the first call.
    pub fn close(&mut self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return Ok(());
        }
        *closed = true;
        drop(closed);
        self.session.release_prepared(self.id)
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A descriptor row has six fields: type, digits, scale, schema, table,
/// column. `column` is `NULL` for parameter placeholders.
fn parse_descriptor_row(row: &crate::protocol::Row) -> Result<Descriptor> {
    if row.len() != 6 {
        return Err(Error::protocol_parse(
            0,
            format!("PREPARE descriptor row has {} fields, expected 6", row.len()),
        ));
    }
    let field = |i: usize| row[i].clone();
    let type_name = field(0)
        .ok_or_else(|| Error::protocol_parse(0, "PREPARE descriptor row missing a type name"))?;
    let digits = field(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    let scale = field(2).and_then(|s| s.parse().ok()).unwrap_or(0);
    Ok(Descriptor {
        type_name,
        digits,
        scale,
        schema: field(3),
        table: field(4),
        column: field(5),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[Option<&str>]) -> crate::protocol::Row {
        fields.iter().map(|f| f.map(str::to_string)).collect()
    }

    #[test]
    fn descriptor_row_splits_into_typed_fields() {
        let r = row(&[
            Some("int"),
            Some("32"),
            Some("0"),
            Some("sys"),
            Some("t"),
            Some("a"),
        ]);
        let d = parse_descriptor_row(&r).unwrap();
        assert_eq!(d.type_name, "int");
        assert_eq!(d.digits, 32);
        assert_eq!(d.column.as_deref(), Some("a"));
    }

    #[test]
    fn descriptor_row_with_null_column_is_a_parameter() {
        let r = row(&[Some("int"), Some("32"), Some("0"), None, None, None]);
        let d = parse_descriptor_row(&r).unwrap();
        assert!(d.column.is_none());
    }

    #[test]
    fn descriptor_row_with_wrong_field_count_is_rejected() {
        let r = row(&[Some("int")]);
        assert!(parse_descriptor_row(&r).is_err());
    }
}
