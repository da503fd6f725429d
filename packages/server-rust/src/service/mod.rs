//! Customer service: registration and the endpoint request pipeline.
//!
//! 1. **Registration** (`registry`): service identity, endpoints, stats
//! 2. **Dispatch** (`dispatch`): bus `Request` -> `Operation`, one reply per request
//! 3. **Middleware** (`middleware`): Tower layers (load-shedding, timeout, metrics)
//! 4. **Routing** (`router`): Operation -> handler by endpoint name
//! 5. **Domain** (`domain`): the balance handler
//! 6. **Startup** (`startup`): wires the above onto a bus and a store

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod startup;

pub use config::{DeliveryMode, ServiceSettings};
pub use dispatch::EndpointDispatcher;
pub use domain::BalanceHandler;
pub use operation::{Operation, OperationContext, OperationError, OperationResponse};
pub use registry::{
    EndpointStatsTracker, MicroService, RegistrationError, ServiceContext, ServiceGroup,
};
pub use router::EndpointRouter;
pub use startup::{start_service, RunningService};
