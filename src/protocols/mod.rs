//! Protocol implementations.
//!
//! - `echo`: transforming echo with deflate renegotiation and
//!   server-side disconnect

pub mod echo;
