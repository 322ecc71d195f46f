//! Field-service dispatch backend.
//!
//! The crate is a hexagonal monolith: [`domain`] owns the order lifecycle
//! rules and declares the ports it needs, [`inbound`] drives it over HTTP and
//! the in-process event stream, [`outbound`] implements the ports against
//! PostgreSQL and the chat platform, and [`server`] wires everything together
//! for the binary.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod server;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
