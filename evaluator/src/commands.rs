use crate::{
    components::{
        users::{User, UserUpdate, Users, UsersConfig},
        Component, RecordError,
    },
    config::{loader::ConfigLoader, Config, ConfigErrors},
    store::PersistenceError,
};
use clap::{builder::NonEmptyStringValueParser, ArgGroup, Args, Parser, Subcommand};
use itertools::Itertools;
use std::{error::Error as StdError, iter, path::PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use tracing_unwrap::ResultExt;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Configuration could not be loaded")]
    Config(#[from] ConfigErrors),
    #[error("Data file could not be accessed")]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("User '{0}' already exists with different data, use --update to change it")]
    UserExists(String),
}

/// Message of an error followed by all of its sources
pub fn report(err: &(dyn StdError + 'static)) -> String {
    iter::successors(Some(err), |err| (*err).source())
        .map(ToString::to_string)
        .join(": ")
}

/// Evaluation of HPC assignments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the main config YAML file
    #[arg(long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Validate every config file before it is loaded
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the configuration and print the resulting tree
    Check,
    /// Describe all configuration options
    Schema,
    /// Introduce a new user or update an existing one
    AddUser(AddUserArgs),
    /// List all known users
    Users,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("identity")
        .required(true)
        .multiple(true)
        .args(["id", "external_id"])
))]
pub struct AddUserArgs {
    /// Identification of the user, generated if missing
    #[arg(long)]
    pub id: Option<String>,

    /// Optional external identification of the user
    #[arg(long)]
    pub external_id: Option<String>,

    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    pub first_name: String,

    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    pub last_name: String,

    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    pub email: String,

    /// Update the user if a record with the same ID exists
    #[arg(long)]
    pub update: bool,
}

impl Cli {
    pub fn load_config(&self, loader: &ConfigLoader) -> Result<Config, ConfigErrors> {
        if self.strict {
            loader.load_validated(&self.config)
        } else {
            loader.load(&self.config)
        }
    }
}

impl Command {
    pub fn execute(&self, loader: &ConfigLoader, config: &Config) -> Result<(), CommandError> {
        debug!(command = ?self, "Executing command");

        match self {
            Self::Check => {
                // a loaded tree holds plain YAML values only
                print!("{}", serde_yaml::to_string(config.tree()).unwrap_or_log());
                Ok(())
            }
            Self::Schema => {
                print!("{}", loader.schema().describe());
                Ok(())
            }
            Self::AddUser(args) => add_user(args, config),
            Self::Users => list_users(config),
        }
    }
}

fn add_user(args: &AddUserArgs, config: &Config) -> Result<(), CommandError> {
    let users_config: UsersConfig = config.section(Users::KEY)?;
    let mut file = Users::data_file(&users_config);
    let mut users = Users::default();

    // held from before the read until the updated records are saved, a missing store is created
    // empty under the lock
    file.load(&mut users, true, true)?;

    let update = UserUpdate {
        external_id: args.external_id.clone(),
        first_name: Some(args.first_name.clone()),
        last_name: Some(args.last_name.clone()),
        email: Some(args.email.clone()),
    };

    let existing = args
        .id
        .as_deref()
        .and_then(|id| users.get(id))
        .or_else(|| {
            args.external_id
                .as_deref()
                .and_then(|external_id| users.get_by_external_id(external_id))
        });

    match existing {
        Some(user) => {
            let id = user.id.clone().unwrap_or_default();

            if user.matches(&update) {
                info!(id = %id, "User already exists and the data match, nothing to do");
                return Ok(());
            }
            if !args.update {
                return Err(CommandError::UserExists(id));
            }

            users.update(&id, update)?;
            file.save(&users, false)?;
            info!(id = %id, "User was updated");
        }
        None => {
            let mut user = User::new(
                args.id.as_deref(),
                &args.first_name,
                &args.last_name,
                &args.email,
            );
            user.external_id = args.external_id.clone();

            let id = users.add(user);
            file.save(&users, false)?;
            info!(id = %id, "New user was created");
        }
    }

    Ok(())
}

fn list_users(config: &Config) -> Result<(), CommandError> {
    let users_config: UsersConfig = config.section(Users::KEY)?;
    let mut file = Users::data_file(&users_config);
    let mut users = Users::default();

    if file.exists() {
        file.load(&mut users, false, false)?;
    }
    if users.is_empty() {
        info!(file = ?file.path(), "There are no users");
        return Ok(());
    }

    for user in users.iter() {
        println!(
            "{}\t{}\t{} {} <{}>",
            user.id.as_deref().unwrap_or_default(),
            user.external_id.as_deref().unwrap_or("-"),
            user.first_name,
            user.last_name,
            user.email
        );
    }

    Ok(())
}
