use super::{
    records::{Record, Records},
    Component, RecordError,
};
use crate::{
    config::descriptors::Descriptor,
    store::{Attributes, Datum, FromDatum, JsonFile, Serializable, SerializationError},
};
use serde::Deserialize;
use std::path::PathBuf;

/// A single user that may submit solutions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    // assigned by `Users::add` when missing
    pub id: Option<String>,
    pub external_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Changed user data, fields left as `None` are kept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub external_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl User {
    pub fn new(
        id: Option<&str>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.map(str::trim).filter(|id| !id.is_empty()).map(str::to_string),
            external_id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn update(&mut self, update: UserUpdate) {
        if let Some(external_id) = update.external_id {
            self.external_id = Some(external_id);
        }
        if let Some(first_name) = update.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            self.last_name = last_name;
        }
        if let Some(email) = update.email {
            self.email = email;
        }
    }

    /// whether `update` would leave this user unchanged
    pub fn matches(&self, update: &UserUpdate) -> bool {
        let mut updated = self.clone();
        updated.update(update.clone());
        updated == *self
    }
}

impl Serializable for User {
    fn type_tag(&self) -> &'static str {
        concat!(module_path!(), "::User")
    }

    fn attributes(&self) -> Attributes {
        Attributes::from([
            ("id".to_string(), Datum::from(self.id.clone())),
            ("external_id".to_string(), Datum::from(self.external_id.clone())),
            ("first_name".to_string(), Datum::from(self.first_name.clone())),
            ("last_name".to_string(), Datum::from(self.last_name.clone())),
            ("email".to_string(), Datum::from(self.email.clone())),
        ])
    }

    fn set_attribute(&mut self, name: &str, value: Datum) -> Result<(), SerializationError> {
        match name {
            "id" => self.id = Option::from_datum(value)?,
            "external_id" => self.external_id = Option::from_datum(value)?,
            "first_name" => self.first_name = String::from_datum(value)?,
            "last_name" => self.last_name = String::from_datum(value)?,
            "email" => self.email = String::from_datum(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl FromDatum for User {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        datum.into_object()
    }
}

impl Record for User {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UsersConfig {
    pub file: PathBuf,
}

/// Store of all known users
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Users {
    users: Records<User>,
}

impl Component for Users {
    const KEY: &'static str = "users";

    fn config_schema() -> Descriptor {
        Descriptor::dictionary([(
            "file",
            Descriptor::string()
                .with_default("_users.json")
                .with_description("Path to the JSON file where user records are stored")
                .path(),
        )])
    }
}

impl Users {
    /// handle of the file the users are persisted in
    pub fn data_file(config: &UsersConfig) -> JsonFile {
        JsonFile::new(&config.file)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn get_by_external_id(&self, external_id: &str) -> Option<&User> {
        self.users.get_by_external_id(external_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.iter()
    }

    /// Add a user and return its ID. A user with the same ID or external ID is not replaced,
    /// the ID of the existing one is returned instead.
    pub fn add(&mut self, user: User) -> String {
        match self.users.existing(&user) {
            Some(id) => id,
            None => self.users.insert(user),
        }
    }

    /// Update user data, the ID stays fixed
    pub fn update(&mut self, id: &str, update: UserUpdate) -> Result<(), RecordError> {
        if self.users.modify(id, |user| user.update(update)) {
            Ok(())
        } else {
            Err(RecordError::UnknownUser(id.to_string()))
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<User> {
        self.users.remove(id)
    }
}

impl Serializable for Users {
    fn type_tag(&self) -> &'static str {
        concat!(module_path!(), "::Users")
    }

    fn attributes(&self) -> Attributes {
        Attributes::from([("users".to_string(), self.users.to_datum())])
    }

    fn set_attribute(&mut self, name: &str, value: Datum) -> Result<(), SerializationError> {
        if name == "users" {
            self.users.restore(value)?;
        }
        Ok(())
    }
}
