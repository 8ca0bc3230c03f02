//! Application state: collection model, registry and startup hydration

pub mod collections;
pub mod hydrate;
pub mod registry;
pub mod seed;

pub use collections::{CollectionKey, SEAL_IMAGE_ASSET};
pub use hydrate::{hydrate, HydrationReport};
pub use registry::{MutationEvent, RegistrySnapshot, StateRegistry, SubscriptionId};
