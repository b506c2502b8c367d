//! Engine-wide contracts: construction options and lifecycle notifications.

mod observable;
mod options;

pub use observable::{EventState, Observable, ObserverId, ObserverRemover};
pub use options::{EngineOptions, UrlTransform};
