// ABOUTME: Incremental line splitting for channel output.
// ABOUTME: Treats \n, \r\n and a lone \r as terminators, across chunk boundaries.

/// Splits a byte stream into lines without their terminators.
///
/// Bytes are decoded lossily as UTF-8 once a line is complete, so a
/// multi-byte character split across two chunks is preserved.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => lines.push(self.take_line()),
                b'\r' => {
                    lines.push(self.take_line());
                    self.after_cr = true;
                }
                _ => self.pending.push(byte),
            }
        }
        lines
    }

    /// End of stream: a trailing unterminated line still counts.
    pub fn finish(mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

/// Split a complete buffer and re-join it with `terminator` after every line.
pub fn normalize(bytes: &[u8], terminator: &str) -> String {
    let mut splitter = LineSplitter::new();
    let mut lines = splitter.push(bytes);
    lines.extend(splitter.finish());

    let mut out = String::with_capacity(bytes.len() + lines.len());
    for line in lines {
        out.push_str(&line);
        out.push_str(terminator);
    }
    out
}
