//! Site directory and event source backends.

pub mod http;
pub mod memory;

pub use http::{HttpEventSource, HttpSiteDirectory};
pub use memory::{StaticDirectory, StaticEventSource};
