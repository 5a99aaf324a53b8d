// ABOUTME: Provides line-level I/O over a modem serial port for the AT command engine
// ABOUTME: Buffers reads so that multi-byte characters split across reads are decoded whole

use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

/// Byte stream to one modem port.
///
/// Reads hand back whatever text the modem produced since the previous
/// read; framing into responses and notifications is the engine's job,
/// since AT replies have no length prefix and may arrive in arbitrary
/// fragments.
#[derive(Debug)]
pub struct Connection<S> {
    // The port. It is decorated with a `BufWriter` so a command plus its
    // terminator go out in one write.
    stream: BufWriter<S>,

    // Bytes read but not yet handed out as text.
    buffer: BytesMut,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new `Connection` backed by `stream`.
    pub fn new(stream: S) -> Connection<S> {
        Connection {
            stream: BufWriter::new(stream),
            // Modem replies are short; the longest are +CMGL listings and
            // +COPS=? scans, a few KB at most.
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Read the next chunk of text from the port.
    ///
    /// Returns `None` when the port reached end of stream. This method is
    /// cancel safe: bytes are moved into the internal buffer before any
    /// decoding happens, so dropping the future loses nothing.
    pub async fn read_text(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(text) = self.take_text() {
                return Ok(Some(text));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                // The port went away. Whatever partial character is left
                // can no longer be completed.
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = String::from_utf8_lossy(&self.buffer).into_owned();
                self.buffer.clear();
                return Ok(Some(rest));
            }
        }
    }

    /// Decode as much buffered data as forms complete characters.
    fn take_text(&mut self) -> Option<String> {
        let mut out = String::new();
        while !self.buffer.is_empty() {
            match std::str::from_utf8(&self.buffer) {
                Ok(text) => {
                    out.push_str(text);
                    self.buffer.clear();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.buffer[..valid]));
                    match e.error_len() {
                        // Truncated sequence at the end, wait for the rest.
                        None => {
                            self.buffer.advance(valid);
                            break;
                        }
                        // Garbage on the line, replace it and carry on.
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.buffer.advance(valid + len);
                        }
                    }
                }
            }
        }
        (!out.is_empty()).then_some(out)
    }

    /// Write `text` to the port and flush it.
    pub async fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.stream.write_all(text.as_bytes()).await?;
        self.stream.flush().await
    }

    /// Give the underlying stream back, discarding buffered input.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_split_multibyte_character() {
        let (client, mut modem) = duplex(64);
        let mut conn = Connection::new(client);

        let bytes = "\r\nñ\r\n".as_bytes();
        modem.write_all(&bytes[..3]).await.unwrap();
        assert_eq!(conn.read_text().await.unwrap().as_deref(), Some("\r\n"));

        modem.write_all(&bytes[3..]).await.unwrap();
        assert_eq!(conn.read_text().await.unwrap().as_deref(), Some("ñ\r\n"));
    }

    #[tokio::test]
    async fn test_invalid_bytes_are_replaced() {
        let (client, mut modem) = duplex(64);
        let mut conn = Connection::new(client);

        modem.write_all(b"A\xffB").await.unwrap();
        assert_eq!(conn.read_text().await.unwrap().as_deref(), Some("A\u{fffd}B"));
    }

    #[tokio::test]
    async fn test_eof_returns_none() {
        let (client, modem) = duplex(64);
        let mut conn = Connection::new(client);
        drop(modem);
        assert_eq!(conn.read_text().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_str_flushes() {
        let (client, mut modem) = duplex(64);
        let mut conn = Connection::new(client);
        conn.write_str("AT+CSQ\r\n").await.unwrap();

        let mut buf = [0u8; 8];
        modem.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AT+CSQ\r\n");
    }
}
