//! Read variables from the environment the engine runs in.

use std::collections::BTreeMap;

/// Variables that override the configured engine settings.
pub const MAX_DEPTH_VARIABLE: &str = "QUERYGATE_MAX_DEPTH";
pub const DEFAULT_LIMIT_VARIABLE: &str = "QUERYGATE_DEFAULT_LIMIT";

/// A source of environment variables.
pub trait Environment {
    /// Read a variable. `Ok(None)` means it is not set.
    fn read(&self, variable: &str) -> Result<Option<String>, Error>;
}

impl<E: Environment> Environment for &E {
    fn read(&self, variable: &str) -> Result<Option<String>, Error> {
        (*self).read(variable)
    }
}

/// The environment of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn read(&self, variable: &str) -> Result<Option<String>, Error> {
        match std::env::var(variable) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(Error::NonUnicodeValue {
                variable: variable.to_string(),
            }),
        }
    }
}

/// A fixed set of variables, for tests.
#[derive(Debug, Clone, Default)]
pub struct FixedEnvironment(BTreeMap<String, String>);

impl<const N: usize> From<[(String, String); N]> for FixedEnvironment {
    fn from(variables: [(String, String); N]) -> Self {
        FixedEnvironment(variables.into_iter().collect())
    }
}

impl Environment for FixedEnvironment {
    fn read(&self, variable: &str) -> Result<Option<String>, Error> {
        Ok(self.0.get(variable).cloned())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the value of {variable} is not valid unicode")]
    NonUnicodeValue { variable: String },
}
