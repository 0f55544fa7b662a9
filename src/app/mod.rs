pub mod broker;
pub mod dispatcher;

pub use broker::{Broker, ResourceLookup};
pub use dispatcher::{ControlPlanes, ServiceDispatcher};
