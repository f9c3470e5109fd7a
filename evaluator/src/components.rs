pub mod assignments;
pub mod logging;
pub mod records;
pub mod solutions;
pub mod users;

#[cfg(test)]
mod records_test;

use crate::{
    config::{descriptors::Descriptor, loader::ConfigLoader, ConfigErrors},
    store::registry,
};
use thiserror::Error;

/// A part of the application that is configured through its own top level config section
pub trait Component {
    /// key of the config section
    const KEY: &'static str;

    /// Schema of the section, an empty dictionary if there is nothing to configure
    fn config_schema() -> Descriptor;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("User with ID '{0}' does not exist")]
    UnknownUser(String),
    #[error("Solution must refer to a {0}")]
    MissingReference(&'static str),
}

/// `(key, schema)` of every component
pub fn schemas() -> Vec<(&'static str, Descriptor)> {
    vec![
        (logging::Logger::KEY, logging::Logger::config_schema()),
        (users::Users::KEY, users::Users::config_schema()),
        (solutions::Solutions::KEY, solutions::Solutions::config_schema()),
        (assignments::Assignments::KEY, assignments::Assignments::config_schema()),
    ]
}

/// Loader of the complete application configuration
pub fn config_loader() -> Result<ConfigLoader, ConfigErrors> {
    ConfigLoader::from_components(schemas())
}

/// Register every record type that is persisted as a nested object
pub fn register_types() {
    registry::register::<users::User>();
    registry::register::<solutions::Solution>();
}
