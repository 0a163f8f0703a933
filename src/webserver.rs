//! Read-only HTTP export of a save list, plus a plain file server.

mod router;
mod server;

pub use router::{CatalogRouter, FileRouter, Reply, Route, Router, parse_route, percent_decode};
pub use server::serve;
