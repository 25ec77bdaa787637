//! Oracle fleet services

pub mod dispatcher;
pub mod event_listener;
pub mod index_cache;
pub mod registry;
pub mod status_generator;

pub use dispatcher::{DispatchReport, DispatchSettings, ResponseDispatcher};
pub use event_listener::EventListener;
pub use index_cache::IndexAssignmentCache;
pub use registry::{IdentityRegistry, RegistrationReport};
pub use status_generator::{FixedStatusGenerator, RandomStatusGenerator, StatusGenerator};
