use super::{datum::Serializable, SerializationError};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::trace;

/// zero argument constructor of a registered type
pub type Factory = fn() -> Box<dyn Serializable>;

/// type tag -> factory of every type that may be rebuilt polymorphically
static REGISTRY: Lazy<RwLock<BTreeMap<&'static str, Factory>>> = Lazy::new(Default::default);

fn construct<T: Serializable + Default>() -> Box<dyn Serializable> {
    Box::new(T::default())
}

/// Make `T` constructible from its type tag. Registering a type twice is harmless.
pub fn register<T: Serializable + Default>() {
    let tag = T::default().type_tag();

    trace!(tag, "Registering serializable type");
    REGISTRY.write().insert(tag, construct::<T>);
}

pub fn is_registered(tag: &str) -> bool {
    REGISTRY.read().contains_key(tag)
}

/// Create an empty instance of the type registered under `tag`
pub fn create(tag: &str) -> Result<Box<dyn Serializable>, SerializationError> {
    let factory = REGISTRY.read().get(tag).copied();

    match factory {
        Some(factory) => Ok(factory()),
        None => Err(SerializationError::UnknownType(tag.to_string())),
    }
}
