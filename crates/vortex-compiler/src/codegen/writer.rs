//! Indented JavaScript text writer

use std::fmt::Write as _;

#[derive(Default)]
pub struct JsWriter {
    out: String,
    indent: usize,
}

impl JsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// One full line at the current indent
    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// `head {` ... with deeper indent until [`close`]
    pub fn open(&mut self, head: impl AsRef<str>) {
        let _ = write!(self.head_buf(), "{} {{", head.as_ref());
        self.flush_head();
        self.indent += 1;
    }

    pub fn close(&mut self, tail: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(format!("}}{}", tail.as_ref()));
    }

    /// Append raw pre-rendered text, re-indented line by line
    pub fn raw_block(&mut self, text: &str) {
        for line in text.lines() {
            if line.is_empty() {
                self.blank();
            } else {
                self.line(line);
            }
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn head_buf(&mut self) -> &mut String {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        &mut self.out
    }

    fn flush_head(&mut self) {
        self.out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_indent() {
        let mut w = JsWriter::new();
        w.open("if (x)");
        w.line("y();");
        w.close("");
        assert_eq!(w.finish(), "if (x) {\n  y();\n}\n");
    }

    #[test]
    fn test_close_tail() {
        let mut w = JsWriter::new();
        w.open("do");
        w.line("step();");
        w.close(" while (true);");
        assert!(w.finish().ends_with("} while (true);\n"));
    }
}
