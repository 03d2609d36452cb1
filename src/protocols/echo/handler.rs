//! Echo protocol handler for the Tokio runtime.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::parser::{self, Command, CHUNK_SIZE};
use crate::error::SessionError;
use crate::session::Session;

/// How a session ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed its side, or a read decoded to nothing.
    PeerClosed,
    /// The peer sent `DISCONNECT`.
    Disconnect,
}

/// Handle an echo protocol connection.
///
/// Each read of up to [`CHUNK_SIZE`] bytes is decoded, checked for control
/// tokens, expanded and written back. The stream is dropped on return,
/// whichever way the session ended.
pub async fn handle_connection<S>(mut stream: S) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new();
    let result = serve(&mut stream, &mut session).await;
    session.close();
    result
}

async fn serve<S>(stream: &mut S, session: &mut Session) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let n = stream.read(&mut buffer).await?;
        trace!(bytes = n, state = ?session.state(), "Read chunk");

        let payload = session.decode(&buffer[..n])?;
        if payload.is_empty() {
            trace!("Connection closed by client");
            return Ok(SessionEnd::PeerClosed);
        }

        debug!(
            payload = %String::from_utf8_lossy(&payload).trim(),
            "Received"
        );

        match parser::parse(&payload) {
            Command::Disconnect => {
                debug!("Disconnect requested");
                return Ok(SessionEnd::Disconnect);
            }
            Command::Echo {
                reply,
                enable_compression,
            } => {
                let wire = session.encode(&reply)?;
                stream.write_all(&wire).await?;
                trace!(bytes = wire.len(), "Sent reply");

                if enable_compression && session.enable_compression() {
                    debug!("Compression enabled");
                }
            }
        }
    }
}
