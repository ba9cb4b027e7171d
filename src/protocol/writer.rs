//! Query/control writer. Wraps outgoing text in the
//! language-appropriate template; writing itself is serialized by the
//! session mutex, not by this type.

use std::io::Write;

use crate::constant::{CONTROL_PREFIX, CONTROL_SUFFIX, Language};
use crate::error::Result;

pub struct Writer<W> {
    inner: W,
    language: Language,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W, language: Language) -> Self {
        Self { inner, language }
    }

    pub fn write_query(&mut self, text: &str) -> Result<()> {
        let t = self.language.templates();
        write!(self.inner, "{}{}{}", t.prefix, text, t.suffix)?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn write_control(&mut self, text: &str) -> Result<()> {
        write!(self.inner, "{CONTROL_PREFIX}{text}{CONTROL_SUFFIX}")?;
        self.inner.flush()?;
        Ok(())
    }

    /// Writes bytes with no template wrapping, used for the fixed
    /// file-transfer error replies the session sends when no handler is
    /// registered.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_query_gets_prefix_and_suffix() {
        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf, Language::Sql);
            w.write_query("select 1").unwrap();
        }
        assert_eq!(buf, b"sselect 1\n;");
    }

    #[test]
    fn control_command_gets_x_prefix_only() {
        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf, Language::Sql);
            w.write_control("reply_size 100").unwrap();
        }
        assert_eq!(buf, b"Xreply_size 100");
    }

    #[test]
    fn mal_query_uses_mal_template() {
        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf, Language::Mal);
            w.write_query("io.print(1)").unwrap();
        }
        assert_eq!(buf, b"io.print(1);\n");
    }
}
