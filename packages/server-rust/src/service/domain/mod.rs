//! Endpoint handlers. Each is a `tower::Service<Operation>` registered with
//! the [`EndpointRouter`](crate::service::router::EndpointRouter).

pub mod balance;

pub use balance::BalanceHandler;
