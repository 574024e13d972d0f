//! Line assembly for UART input

/// Result of pushing a byte that ended (or broke) a line.
#[derive(Debug, PartialEq, Eq)]
pub enum LinePush<'a> {
    /// A non-empty line, without its terminator
    Line(&'a [u8]),
    /// Budget exceeded; the partial line was discarded
    Overflow,
}

/// Accumulates bytes into `\n` or `\r` terminated lines.
///
/// Holds at most `N` bytes of an unfinished line. The byte that would exceed
/// the budget discards the whole partial line. Empty lines (e.g. the `\n` of
/// a `\r\n` pair) are skipped.
pub struct LineAssembler<const N: usize> {
    buf: [u8; N],
    len: usize,
    /// Set after a line was returned; cleared on the next push
    completed: bool,
}

impl<const N: usize> LineAssembler<N> {
    /// Create empty assembler
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            len: 0,
            completed: false,
        }
    }

    /// Push one received byte
    pub fn push(&mut self, byte: u8) -> Option<LinePush<'_>> {
        if self.completed {
            self.completed = false;
            self.len = 0;
        }

        match byte {
            b'\n' | b'\r' => {
                if self.len == 0 {
                    return None;
                }
                self.completed = true;
                Some(LinePush::Line(&self.buf[..self.len]))
            }
            _ if self.len == N => {
                self.len = 0;
                Some(LinePush::Overflow)
            }
            _ => {
                self.buf[self.len] = byte;
                self.len += 1;
                None
            }
        }
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.len = 0;
        self.completed = false;
    }

    /// Bytes of the unfinished line
    pub fn as_bytes(&self) -> &[u8] {
        if self.completed {
            &[]
        } else {
            &self.buf[..self.len]
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for LineAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(s: &str) -> Result<String, ()> {
        Ok(String::from(s))
    }

    fn feed<const N: usize>(asm: &mut LineAssembler<N>, bytes: &[u8]) -> Vec<Result<String, ()>> {
        let mut out = Vec::new();
        for &b in bytes {
            match asm.push(b) {
                Some(LinePush::Line(l)) => out.push(Ok(String::from_utf8_lossy(l).into_owned())),
                Some(LinePush::Overflow) => out.push(Err(())),
                None => {}
            }
        }
        out
    }

    #[test]
    fn test_crlf_yields_single_line() {
        let mut asm = LineAssembler::<32>::new();
        assert_eq!(feed(&mut asm, b"ST,GS,  12.50kg\r\n"), [ok("ST,GS,  12.50kg")]);
        assert!(asm.is_empty());
    }

    #[test]
    fn test_bare_cr_terminates() {
        let mut asm = LineAssembler::<32>::new();
        assert_eq!(
            feed(&mut asm, b"a\rb\r"),
            [ok("a"), ok("b")]
        );
    }

    #[test]
    fn test_exact_budget_fits() {
        let mut asm = LineAssembler::<4>::new();
        assert_eq!(feed(&mut asm, b"abcd\n"), [ok("abcd")]);
    }

    #[test]
    fn test_overflow_discards_partial_line() {
        let mut asm = LineAssembler::<4>::new();
        assert_eq!(feed(&mut asm, b"abcdefg\nxy\n"), [Err(()), ok("fg"), ok("xy")]);
    }

    #[test]
    fn test_partial_line_survives_between_pushes() {
        let mut asm = LineAssembler::<16>::new();
        assert!(feed(&mut asm, b"W: 1").is_empty());
        assert_eq!(asm.as_bytes(), b"W: 1");
        assert_eq!(feed(&mut asm, b"2\n"), [ok("W: 12")]);
    }

    #[test]
    fn test_clear() {
        let mut asm = LineAssembler::<16>::new();
        feed(&mut asm, b"garbage");
        asm.clear();
        assert_eq!(feed(&mut asm, b"ok\n"), [ok("ok")]);
    }
}
