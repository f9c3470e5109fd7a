use super::Component;
use crate::config::{descriptors::Descriptor, Config, ConfigErrors};
use serde::Deserialize;
use std::{collections::BTreeMap, path::PathBuf};
use tracing::warn;

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    // directory with files copied over the solution before building
    pub overlay: Option<PathBuf>,
    // each command is a program followed by its arguments
    #[serde(default)]
    pub run: Vec<Vec<String>>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    pub build: Option<String>,
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    #[serde(default)]
    pub builds: BTreeMap<String, BuildConfig>,
    #[serde(default)]
    pub tests: BTreeMap<String, TestConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub id: String,
    pub builds: BTreeMap<String, BuildConfig>,
    pub tests: BTreeMap<String, TestConfig>,
}

impl Assignment {
    /// build a test refers to, `None` if the test has no build or it is not declared
    pub fn build_of(&self, test: &str) -> Option<&BuildConfig> {
        let build = self.tests.get(test)?.build.as_deref()?;
        self.builds.get(build)
    }
}

/// All assignments declared in the configuration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignments {
    assignments: BTreeMap<String, Assignment>,
}

impl Component for Assignments {
    const KEY: &'static str = "assignments";

    fn config_schema() -> Descriptor {
        let build = Descriptor::dictionary([
            (
                "overlay",
                Descriptor::string()
                    .with_description("Path to the directory with build files")
                    .path(),
            ),
            (
                "run",
                Descriptor::list(Descriptor::list(Descriptor::string()).collapsible())
                    .with_description("Commands executed to build the solution"),
            ),
        ]);
        let test = Descriptor::dictionary([
            (
                "build",
                Descriptor::string().with_description("Name of the build used by this test"),
            ),
            (
                "inputs",
                Descriptor::list(Descriptor::string().path())
                    .with_description("Files required by the test (like input data)"),
            ),
        ]);

        Descriptor::named_list(Descriptor::dictionary([
            (
                "builds",
                Descriptor::named_list(build)
                    .with_description("Build specifications, referred to from tests"),
            ),
            (
                "tests",
                Descriptor::named_list(test).with_description("Tests executed for every solution"),
            ),
        ]))
    }
}

impl Assignments {
    pub fn from_config(config: &Config) -> Result<Self, ConfigErrors> {
        let sections: BTreeMap<String, AssignmentConfig> = config.section(Self::KEY)?;

        let assignments = sections
            .into_iter()
            .map(|(id, section)| {
                for (test, test_config) in &section.tests {
                    if let Some(build) = &test_config.build {
                        if !section.builds.contains_key(build) {
                            warn!(assignment = %id, test = %test, build = %build, "Test refers to an undeclared build");
                        }
                    }
                }

                let assignment = Assignment {
                    id: id.clone(),
                    builds: section.builds,
                    tests: section.tests,
                };
                (id, assignment)
            })
            .collect();

        Ok(Self { assignments })
    }

    pub fn get(&self, id: &str) -> Option<&Assignment> {
        self.assignments.get(id)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.values()
    }
}
