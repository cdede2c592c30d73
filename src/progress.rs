use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Extracts the download percentage from one line of fetcher output.
///
/// Only lines carrying both a `<digits>%` token and the `ETA` marker count;
/// the first whitespace-separated token ending in `%` is read as the value.
/// Anything unparseable or outside 0..=100 yields `None`.
pub fn parse_progress_from_line(line: &str) -> Option<f64> {
    if !line.contains("ETA") || !has_percent_token(line) {
        return None;
    }
    let token = line.split_whitespace().find(|t| t.ends_with('%'))?;
    let value = token.trim_end_matches('%').parse::<f64>().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

fn has_percent_token(line: &str) -> bool {
    line.as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_digit() && w[1] == b'%')
}

/// Reads fetcher output one display line at a time as bytes arrive.
///
/// Both `\n` and `\r` end a line, so each progress redraw is delivered
/// immediately. A `\r\n` pair ends one line. A bare `\r` with nothing
/// before it only returns the cursor and yields no line; a bare `\n` always
/// does, so blank lines survive. Invalid UTF-8 is replaced.
pub struct OutputLines<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    after_cr: bool,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            after_cr: false,
        }
    }

    /// Next line, or `None` at end of stream.
    ///
    /// Cancel safe: bytes move from the buffer into `pending` only after
    /// `fill_buf` has returned, so dropping the future loses nothing.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_pending()));
            }

            if self.after_cr && buf[0] == b'\n' {
                self.after_cr = false;
                self.reader.consume(1);
                continue;
            }
            self.after_cr = false;

            match buf.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(end) => {
                    let terminator = buf[end];
                    self.pending.extend_from_slice(&buf[..end]);
                    self.reader.consume(end + 1);
                    if terminator == b'\r' {
                        self.after_cr = true;
                        if self.pending.is_empty() {
                            continue;
                        }
                    }
                    return Ok(Some(self.take_pending()));
                }
                None => {
                    let len = buf.len();
                    self.pending.extend_from_slice(buf);
                    self.reader.consume(len);
                }
            }
        }
    }

    fn take_pending(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}
