use super::{
    records::{Record, Records},
    Component, RecordError,
};
use crate::{
    config::descriptors::Descriptor,
    store::{Attributes, Datum, FromDatum, JsonFile, Serializable, SerializationError},
};
use serde::Deserialize;
use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::trace;

/// One submission of one user addressing one assignment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    pub id: Option<String>,
    pub external_id: Option<String>,
    pub user_id: Option<String>,
    pub assignment_id: Option<String>,
    // unix timestamp [s]
    pub submitted_at: i64,
}

impl Solution {
    /// new solution submitted now
    pub fn new(user_id: impl Into<String>, assignment_id: impl Into<String>) -> Self {
        let submitted_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default();

        Self {
            id: None,
            external_id: None,
            user_id: Some(user_id.into()),
            assignment_id: Some(assignment_id.into()),
            submitted_at,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

impl Serializable for Solution {
    fn type_tag(&self) -> &'static str {
        concat!(module_path!(), "::Solution")
    }

    fn attributes(&self) -> Attributes {
        Attributes::from([
            ("id".to_string(), Datum::from(self.id.clone())),
            ("external_id".to_string(), Datum::from(self.external_id.clone())),
            ("user_id".to_string(), Datum::from(self.user_id.clone())),
            ("assignment_id".to_string(), Datum::from(self.assignment_id.clone())),
            ("submitted_at".to_string(), Datum::from(self.submitted_at)),
        ])
    }

    fn set_attribute(&mut self, name: &str, value: Datum) -> Result<(), SerializationError> {
        match name {
            "id" => self.id = Option::from_datum(value)?,
            "external_id" => self.external_id = Option::from_datum(value)?,
            "user_id" => self.user_id = Option::from_datum(value)?,
            "assignment_id" => self.assignment_id = Option::from_datum(value)?,
            "submitted_at" => self.submitted_at = i64::from_datum(value)?,
            _ => {}
        }
        Ok(())
    }
}

impl FromDatum for Solution {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        datum.into_object()
    }
}

impl Record for Solution {
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
pub struct SolutionsConfig {
    pub file: PathBuf,
}

/// Store of all submitted solutions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solutions {
    solutions: Records<Solution>,
}

impl Component for Solutions {
    const KEY: &'static str = "solutions";

    fn config_schema() -> Descriptor {
        Descriptor::dictionary([(
            "file",
            Descriptor::string()
                .with_default("_solutions/solutions.json")
                .with_description("Path to the JSON file where solution records are stored")
                .path(),
        )])
    }
}

impl Solutions {
    pub fn data_file(config: &SolutionsConfig) -> JsonFile {
        JsonFile::new(&config.file)
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Solution> {
        self.solutions.get(id)
    }

    pub fn get_by_external_id(&self, external_id: &str) -> Option<&Solution> {
        self.solutions.get_by_external_id(external_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Solution> {
        self.solutions.iter()
    }

    /// Add a solution and return its ID, `None` if a solution with the same ID or external ID
    /// already exists
    pub fn add(&mut self, solution: Solution) -> Result<Option<String>, RecordError> {
        if solution.user_id.is_none() {
            return Err(RecordError::MissingReference("user"));
        }
        if solution.assignment_id.is_none() {
            return Err(RecordError::MissingReference("assignment"));
        }

        if let Some(existing) = self.solutions.existing(&solution) {
            trace!(id = %existing, "Solution already exists");
            return Ok(None);
        }

        Ok(Some(self.solutions.insert(solution)))
    }

    /// Only used when a submission has to be discarded
    pub fn remove(&mut self, id: &str) -> Option<Solution> {
        self.solutions.remove(id)
    }
}

impl Serializable for Solutions {
    fn type_tag(&self) -> &'static str {
        concat!(module_path!(), "::Solutions")
    }

    fn attributes(&self) -> Attributes {
        Attributes::from([("solutions".to_string(), self.solutions.to_datum())])
    }

    fn set_attribute(&mut self, name: &str, value: Datum) -> Result<(), SerializationError> {
        if name == "solutions" {
            self.solutions.restore(value)?;
        }
        Ok(())
    }
}
