//! HTTP routes served by the `collegium` binary.
//!
//! Each module returns its [`Route`](collegium_server::Route)s with the
//! filter chain spelled out at registration time.

pub mod departments;
pub mod headers;
