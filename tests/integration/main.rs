//! End-to-end tests over the public crate API.

mod lifecycle;
mod http;
