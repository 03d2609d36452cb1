//! Echo protocol implementation.
//!
//! A test service for clients that must cope with streamed text, a
//! mid-connection switch to compression and a server-side hang-up:
//! - Client sends arbitrary bytes
//! - Server echoes them with every `x` replaced by `ThisIsLong`
//!
//! ## Control Tokens
//!
//! Tokens are matched inside each received chunk; there is no framing.
//!
//! - `COMPRESS` as a prefix: the reply to this chunk is still plaintext,
//!   every later chunk is raw deflate in both directions. Each reply is
//!   full-flushed so it can be decoded on arrival.
//! - `DISCONNECT` anywhere: the server closes the connection without a
//!   reply.
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  hello x world
//! Response: hello ThisIsLong world
//!
//! Request:  COMPRESSx
//! Response: COMPRESSThisIsLong          (plaintext)
//! Request:  <raw deflate "abc">
//! Response: <raw deflate "abc">
//!
//! Request:  DISCONNECT now
//! Response: (connection closed)
//! ```

pub mod handler;
pub mod parser;

pub use handler::handle_connection;
