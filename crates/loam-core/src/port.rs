use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::SourcePos;

/// Transport behind a port. The core only ever sees codepoints in and
/// strings out; transport details stay opaque.
pub enum PortKind {
    /// In-memory input: decoded codepoints plus a read cursor.
    StrIn { data: Vec<char>, pos: usize },
    /// In-memory output sink (capture).
    StrOut { out: String },
    FileIn { reader: BufReader<File> },
    FileOut { writer: BufWriter<File> },
    /// Embedder-supplied write callback; no file descriptor anywhere.
    Callback { write: Box<dyn FnMut(&str)> },
}

/// A port: the evaluator's sole I/O abstraction. Tracks name/line/column for
/// reader diagnostics and supports single-level codepoint pushback.
pub struct PortState {
    pub kind: PortKind,
    pub name: String,
    pub line: u32,
    pub col: u32,
    pushback: Vec<char>,
    pub closed: bool,
}

impl PortState {
    pub fn string_input(name: impl Into<String>, text: &str) -> PortState {
        PortState {
            kind: PortKind::StrIn {
                data: text.chars().collect(),
                pos: 0,
            },
            name: name.into(),
            line: 1,
            col: 1,
            pushback: Vec::new(),
            closed: false,
        }
    }

    pub fn string_output(name: impl Into<String>) -> PortState {
        PortState {
            kind: PortKind::StrOut { out: String::new() },
            name: name.into(),
            line: 1,
            col: 1,
            pushback: Vec::new(),
            closed: false,
        }
    }

    pub fn file_input(path: &Path) -> std::io::Result<PortState> {
        let file = File::open(path)?;
        Ok(PortState {
            kind: PortKind::FileIn {
                reader: BufReader::new(file),
            },
            name: path.display().to_string(),
            line: 1,
            col: 1,
            pushback: Vec::new(),
            closed: false,
        })
    }

    pub fn file_output(path: &Path) -> std::io::Result<PortState> {
        let file = File::create(path)?;
        Ok(PortState {
            kind: PortKind::FileOut {
                writer: BufWriter::new(file),
            },
            name: path.display().to_string(),
            line: 1,
            col: 1,
            pushback: Vec::new(),
            closed: false,
        })
    }

    pub fn callback(name: impl Into<String>, write: Box<dyn FnMut(&str)>) -> PortState {
        PortState {
            kind: PortKind::Callback { write },
            name: name.into(),
            line: 1,
            col: 1,
            pushback: Vec::new(),
            closed: false,
        }
    }

    pub fn pos(&self) -> SourcePos {
        SourcePos::new(self.name.clone(), self.line, self.col)
    }

    /// Next codepoint, or `None` at end of input.
    pub fn read_codepoint(&mut self) -> Result<Option<char>, String> {
        if self.closed {
            return Err("port is closed".to_string());
        }
        let c = if let Some(c) = self.pushback.pop() {
            Some(c)
        } else {
            match &mut self.kind {
                PortKind::StrIn { data, pos } => {
                    if *pos < data.len() {
                        let c = data[*pos];
                        *pos += 1;
                        Some(c)
                    } else {
                        None
                    }
                }
                PortKind::FileIn { reader } => read_utf8_codepoint(reader)?,
                _ => return Err("not an input port".to_string()),
            }
        };
        if let Some(c) = c {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        Ok(c)
    }

    /// Push one codepoint back; the next read returns it again.
    pub fn unread_codepoint(&mut self, c: char) {
        if c == '\n' {
            self.line = self.line.saturating_sub(1);
            self.col = 1;
        } else {
            self.col = self.col.saturating_sub(1).max(1);
        }
        self.pushback.push(c);
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), String> {
        if self.closed {
            return Err("port is closed".to_string());
        }
        match &mut self.kind {
            PortKind::StrOut { out } => {
                out.push_str(s);
                Ok(())
            }
            PortKind::FileOut { writer } => {
                writer.write_all(s.as_bytes()).map_err(|e| e.to_string())
            }
            PortKind::Callback { write } => {
                write(s);
                Ok(())
            }
            _ => Err("not an output port".to_string()),
        }
    }

    pub fn flush(&mut self) -> Result<(), String> {
        if let PortKind::FileOut { writer } = &mut self.kind {
            writer.flush().map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Close the port. Flushes output; further operations error. Also run by
    /// the GC finalizer when a port cell is swept (dropping the writer
    /// flushes it).
    pub fn close(&mut self) -> Result<(), String> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Captured output of a string-output port.
    pub fn captured(&self) -> Option<&str> {
        match &self.kind {
            PortKind::StrOut { out } => Some(out),
            _ => None,
        }
    }
}

/// Decode one UTF-8 codepoint from a byte stream. Invalid sequences are
/// reported, not replaced.
fn read_utf8_codepoint(reader: &mut BufReader<File>) -> Result<Option<char>, String> {
    let mut first = [0u8; 1];
    match reader.read(&mut first) {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(e) => return Err(e.to_string()),
    }
    let b = first[0];
    let extra = if b < 0x80 {
        0
    } else if b & 0xe0 == 0xc0 {
        1
    } else if b & 0xf0 == 0xe0 {
        2
    } else if b & 0xf8 == 0xf0 {
        3
    } else {
        return Err(format!("invalid utf-8 lead byte 0x{b:02x}"));
    };
    let mut buf = [0u8; 4];
    buf[0] = b;
    if extra > 0 {
        if let Err(e) = reader.read_exact(&mut buf[1..1 + extra]) {
            return Err(e.to_string());
        }
    }
    match std::str::from_utf8(&buf[..1 + extra]) {
        Ok(s) => Ok(s.chars().next()),
        Err(_) => Err("invalid utf-8 sequence".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1. String port reads codepoints and tracks line/column
    #[test]
    fn string_port_positions() {
        let mut p = PortState::string_input("<test>", "ab\nc");
        assert_eq!(p.read_codepoint().unwrap(), Some('a'));
        assert_eq!((p.line, p.col), (1, 2));
        assert_eq!(p.read_codepoint().unwrap(), Some('b'));
        assert_eq!(p.read_codepoint().unwrap(), Some('\n'));
        assert_eq!((p.line, p.col), (2, 1));
        assert_eq!(p.read_codepoint().unwrap(), Some('c'));
        assert_eq!(p.read_codepoint().unwrap(), None);
    }

    // 2. Unread hands the same codepoint back
    #[test]
    fn unread_round_trip() {
        let mut p = PortState::string_input("<test>", "xy");
        let c = p.read_codepoint().unwrap().unwrap();
        p.unread_codepoint(c);
        assert_eq!(p.read_codepoint().unwrap(), Some('x'));
        assert_eq!(p.read_codepoint().unwrap(), Some('y'));
    }

    // 3. Multibyte codepoints come through whole
    #[test]
    fn multibyte() {
        let mut p = PortState::string_input("<test>", "λ🦀");
        assert_eq!(p.read_codepoint().unwrap(), Some('λ'));
        assert_eq!(p.read_codepoint().unwrap(), Some('🦀'));
        assert_eq!(p.read_codepoint().unwrap(), None);
    }

    // 4. String-output capture
    #[test]
    fn capture_output() {
        let mut p = PortState::string_output("<out>");
        p.write_str("hello ").unwrap();
        p.write_str("world").unwrap();
        assert_eq!(p.captured(), Some("hello world"));
    }

    // 5. Closed ports refuse operations
    #[test]
    fn closed_port_errors() {
        let mut p = PortState::string_input("<test>", "a");
        p.close().unwrap();
        assert!(p.read_codepoint().is_err());
    }

    // 6. File ports round-trip through the filesystem
    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        {
            let mut out = PortState::file_output(&path).unwrap();
            out.write_str("héllo\n").unwrap();
            out.close().unwrap();
        }
        let mut inp = PortState::file_input(&path).unwrap();
        let mut got = String::new();
        while let Some(c) = inp.read_codepoint().unwrap() {
            got.push(c);
        }
        assert_eq!(got, "héllo\n");
    }

    // 7. Callback ports invoke the embedder's sink
    #[test]
    fn callback_port() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let seen: Rc<RefCell<String>> = Rc::new(RefCell::new(String::new()));
        let sink = Rc::clone(&seen);
        let mut p = PortState::callback(
            "<cb>",
            Box::new(move |s| sink.borrow_mut().push_str(s)),
        );
        p.write_str("ping").unwrap();
        assert_eq!(&*seen.borrow(), "ping");
    }
}
