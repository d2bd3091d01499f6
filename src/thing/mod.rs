//! Things: addressing, descriptions, envelopes, handlers and hosting

pub mod address;
pub mod deployer;
pub mod description;
pub mod envelope;
pub mod handler;
pub mod runtime;

pub use address::{Address, Operation, address};
pub use deployer::{DeploymentId, Deployer, ThingDeployer, ThingFactory};
pub use description::{Interaction, InteractionKind, Security, ThingDescription, Verb};
pub use envelope::{InteractionAuthorization, RoleGrant, ThingRequest, ThingResponse};
pub use handler::{Handler, HandlerRegistry};
pub use runtime::{RunningThing, Thing, ThingConfiguration, launch};
