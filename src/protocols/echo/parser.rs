//! Echo protocol parser.
//!
//! Control tokens are plain substrings of the received chunk. There is no
//! framing: each read is inspected on its own.

use bytes::BytesMut;

/// Maximum bytes taken from the socket per read.
pub const CHUNK_SIZE: usize = 2048;

/// Prefix that switches the session to deflate after the reply is sent.
pub const COMPRESS_PREFIX: &[u8] = b"COMPRESS";

/// Substring that makes the server hang up without replying.
pub const DISCONNECT_TOKEN: &[u8] = b"DISCONNECT";

/// Byte replaced in every reply.
pub const EXPAND_BYTE: u8 = b'x';

/// Replacement for each [`EXPAND_BYTE`].
pub const EXPANSION: &[u8] = b"ThisIsLong";

/// Parsed echo command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Close the connection without a reply.
    Disconnect,
    /// Send `reply`, then switch to deflate if `enable_compression` is set.
    Echo {
        reply: BytesMut,
        enable_compression: bool,
    },
}

/// Parse a non-empty logical payload.
pub fn parse(payload: &[u8]) -> Command {
    if contains(payload, DISCONNECT_TOKEN) {
        return Command::Disconnect;
    }

    Command::Echo {
        reply: expand(payload),
        enable_compression: payload.starts_with(COMPRESS_PREFIX),
    }
}

/// Replace every `x` with `ThisIsLong`.
pub fn expand(payload: &[u8]) -> BytesMut {
    let count = payload.iter().filter(|&&b| b == EXPAND_BYTE).count();
    let mut reply = BytesMut::with_capacity(payload.len() + count * (EXPANSION.len() - 1));

    for (i, segment) in payload.split(|&b| b == EXPAND_BYTE).enumerate() {
        if i > 0 {
            reply.extend_from_slice(EXPANSION);
        }
        reply.extend_from_slice(segment);
    }

    reply
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(payload: &[u8]) -> (Vec<u8>, bool) {
        match parse(payload) {
            Command::Echo {
                reply,
                enable_compression,
            } => (reply.to_vec(), enable_compression),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_plain_echo() {
        assert_eq!(echo(b"hello world\r\n"), (b"hello world\r\n".to_vec(), false));
    }

    #[test]
    fn test_expand_single() {
        assert_eq!(echo(b"hello x world").0, b"hello ThisIsLong world");
    }

    #[test]
    fn test_expand_every_occurrence() {
        let input = b"xx axbx x";
        let reply = expand(input);

        let xs = input.iter().filter(|&&b| b == b'x').count();
        let expected_len = input.len() + xs * (EXPANSION.len() - 1);
        assert_eq!(reply.len(), expected_len);
        assert_eq!(
            &reply[..],
            b"ThisIsLongThisIsLong aThisIsLongbThisIsLong ThisIsLong"
        );
    }

    #[test]
    fn test_expand_is_case_sensitive() {
        assert_eq!(&expand(b"X marks")[..], b"X marks");
    }

    #[test]
    fn test_expand_binary_payload() {
        assert_eq!(&expand(&[0x00, b'x', 0xff])[..], b"\x00ThisIsLong\xff");
    }

    #[test]
    fn test_compress_prefix() {
        assert_eq!(echo(b"COMPRESSx"), (b"COMPRESSThisIsLong".to_vec(), true));
        assert_eq!(echo(b"COMPRESS\r\n"), (b"COMPRESS\r\n".to_vec(), true));
    }

    #[test]
    fn test_compress_not_prefix() {
        assert!(!echo(b"please COMPRESS").1);
        assert!(!echo(b"compress").1);
    }

    #[test]
    fn test_disconnect_anywhere() {
        assert_eq!(parse(b"DISCONNECT now"), Command::Disconnect);
        assert_eq!(parse(b"xx DISCONNECT"), Command::Disconnect);
        assert_eq!(parse(b"COMPRESS then DISCONNECT"), Command::Disconnect);
    }

    #[test]
    fn test_partial_disconnect_token() {
        assert_eq!(echo(b"DISCONNEC").0, b"DISCONNEC");
    }
}
