//! nativelog - Line codec and file utilities for logs of a native host process.
//!
//! This library provides the lenient line codec used to exchange timestamped
//! log records with a native process over a tailed channel, plus the
//! append/tail file transport and the best-effort JSON state store around it.

pub mod codec;
pub mod record;
pub mod store;
pub mod tail;
