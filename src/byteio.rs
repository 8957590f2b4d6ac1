//! Buffered byte-level I/O shared by both codecs.
//!
//! Once a read hits end-of-file the `eof` flag is sticky: every later read
//! call fails the same way rather than re-probing the underlying file, which
//! matches how callers use `is_eof()` to drive their row loops.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

enum Inner {
    Read(BufReader<File>),
    Write(BufWriter<File>),
}

pub struct ByteIo {
    inner: Inner,
    eof: bool,
}

impl ByteIo {
    pub fn open_read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::FileNotFound { path: path.display().to_string() }
            } else {
                Error::Io(e)
            }
        })?;
        Ok(ByteIo { inner: Inner::Read(BufReader::new(file)), eof: false })
    }

    pub fn create_write(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(ByteIo { inner: Inner::Write(BufWriter::new(file)), eof: false })
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.inner, Inner::Read(_))
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn close(mut self) -> Result<()> {
        if let Inner::Write(w) = &mut self.inner {
            w.flush()?;
        }
        Ok(())
    }

    pub fn tell(&mut self) -> Result<u64> {
        let pos = match &mut self.inner {
            Inner::Read(r) => r.stream_position()?,
            Inner::Write(w) => w.stream_position()?,
        };
        Ok(pos)
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        match &mut self.inner {
            Inner::Read(r) => {
                r.seek(SeekFrom::Start(pos))?;
            }
            Inner::Write(w) => {
                w.seek(SeekFrom::Start(pos))?;
            }
        }
        self.eof = false;
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.eof {
            return Err(Error::UnexpectedEof { message: "read past sticky EOF".into() });
        }
        let reader = match &mut self.inner {
            Inner::Read(r) => r,
            Inner::Write(_) => return Err(Error::failure("stream not open for reading")),
        };
        match reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.eof = true;
                Err(Error::UnexpectedEof { message: "unexpected end of file".into() })
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Reads one byte, returning `None` at EOF without marking it sticky --
    /// used by the text parser's lookahead, which routinely probes past the
    /// last byte of a well-formed file.
    pub fn peek_byte(&mut self) -> Result<Option<u8>> {
        let reader = match &mut self.inner {
            Inner::Read(r) => r,
            Inner::Write(_) => return Err(Error::failure("stream not open for reading")),
        };
        let buf = reader.fill_buf()?;
        Ok(buf.first().copied())
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        match self.peek_byte()? {
            None => {
                self.eof = true;
                Ok(None)
            }
            Some(b) => {
                if let Inner::Read(r) = &mut self.inner {
                    r.consume(1);
                }
                Ok(Some(b))
            }
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match &mut self.inner {
            Inner::Write(w) => {
                w.write_all(buf)?;
                Ok(())
            }
            Inner::Read(_) => Err(Error::failure("stream not open for writing")),
        }
    }

    /// Skips whitespace and `//` line comments. Fails if a lone `/` is found
    /// that isn't the start of a `//` comment -- the text format has no
    /// other use for a bare slash outside string literals.
    pub fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            match self.peek_byte()? {
                Some(b) if b.is_ascii_whitespace() => {
                    self.read_byte()?;
                }
                Some(b'/') => {
                    self.read_byte()?;
                    match self.peek_byte()? {
                        Some(b'/') => {
                            self.read_byte()?;
                            loop {
                                match self.read_byte()? {
                                    None | Some(b'\n') => break,
                                    Some(_) => {}
                                }
                            }
                        }
                        _ => {
                            return Err(Error::failure("stray '/' outside of a '//' comment"));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Scans forward from the current position counting newlines until the
    /// next `[` (the start of the following record header) or EOF, then
    /// rewinds to the saved position. Used to size a `: ?` dynamic-count
    /// record before its rows are actually parsed.
    pub fn scan_dynamic_row_count(&mut self) -> Result<usize> {
        let saved = self.tell()?;
        let mut newlines = 0usize;
        loop {
            match self.read_byte()? {
                None => break,
                Some(b'[') => break,
                Some(b'\n') => newlines += 1,
                Some(_) => {}
            }
        }
        self.seek(saved)?;
        Ok(newlines.saturating_sub(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn sticky_eof_after_exhausted_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"ab").unwrap();
        let mut io = ByteIo::open_read(&path).unwrap();
        let mut buf = [0u8; 2];
        io.read_exact(&mut buf).unwrap();
        assert!(io.read_exact(&mut [0u8; 1]).is_err());
        assert!(io.is_eof());
        assert!(io.read_exact(&mut [0u8; 1]).is_err());
    }

    #[test]
    fn skip_whitespace_and_line_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"   // a comment\nREST").unwrap();
        let mut io = ByteIo::open_read(&path).unwrap();
        io.skip_whitespace_and_comments().unwrap();
        let mut buf = [0u8; 4];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"REST");
    }

    #[test]
    fn stray_slash_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"/ nope").unwrap();
        let mut io = ByteIo::open_read(&path).unwrap();
        assert!(io.skip_whitespace_and_comments().is_err());
    }

    #[test]
    fn missing_file_reports_not_found() {
        let err = ByteIo::open_read("/nonexistent/path/does-not-exist.txt").unwrap_err();
        assert_eq!(err.state(), crate::error::State::FileNotFound);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        {
            let mut io = ByteIo::create_write(&path).unwrap();
            io.write_all(b"hello").unwrap();
            io.close().unwrap();
        }
        let mut io = ByteIo::open_read(&path).unwrap();
        let mut buf = [0u8; 5];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }
}
