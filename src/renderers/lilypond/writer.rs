//! Indentation-aware text writer
//!
//! Keeps track of the current scope depth and prefixes the first write of
//! every line with the matching indentation. Scopes print their header
//! followed by `{` and close with `}` on its own line at the outer depth.

use std::io::{self, Write};

pub struct IndentedWriter<'a> {
    out: &'a mut dyn Write,
    indent: usize,
    current: usize,
    at_line_start: bool,
}

impl<'a> IndentedWriter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self::with_indent(out, 4)
    }

    pub fn with_indent(out: &'a mut dyn Write, indent: usize) -> Self {
        IndentedWriter { out, indent, current: 0, at_line_start: true }
    }

    pub fn print(&mut self, text: &str) -> io::Result<()> {
        self.write_indent()?;
        self.out.write_all(text.as_bytes())
    }

    pub fn println(&mut self, text: &str) -> io::Result<()> {
        self.print(text)?;
        self.newline()
    }

    pub fn newline(&mut self) -> io::Result<()> {
        self.out.write_all(b"\n")?;
        self.at_line_start = true;
        Ok(())
    }

    pub fn open_scope(&mut self, header: &str) -> io::Result<()> {
        self.print(header)?;
        self.current += self.indent;
        self.println("{")
    }

    pub fn close_scope(&mut self) -> io::Result<()> {
        self.current = self.current.saturating_sub(self.indent);
        self.println("}")
    }

    fn write_indent(&mut self) -> io::Result<()> {
        if self.at_line_start {
            self.at_line_start = false;
            for _ in 0..self.current {
                self.out.write_all(b" ")?;
            }
        }
        Ok(())
    }
}
