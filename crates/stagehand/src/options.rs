use core::fmt;

use serde::Deserialize;

use crate::library::LibraryName;
use crate::stage::Stage;

/// Error raised when trying to parse an invalid option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptionError {
    option: Box<str>,
    reason: Option<Box<str>>,
}

impl fmt::Display for ParseOptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "Invalid build option `{}`: {reason}", self.option),
            None => write!(f, "Unsupported build option `{}`", self.option),
        }
    }
}

impl std::error::Error for ParseOptionError {}

/// Error raised when a configuration document can't be loaded.
#[derive(Debug, thiserror::Error)]
#[error("Invalid build configuration")]
pub struct ConfigurationError {
    #[from]
    source: toml::de::Error,
}

/// Options that can be provided to a build.
///
/// Options deserialize from kebab-case keys, so they can be read from a
/// configuration file:
///
/// ```
/// use stagehand::{Options, Stage};
///
/// let options = Options::from_toml(r#"
/// step-quota = 10
/// stop-before = "generate-code"
/// "#)?;
///
/// assert_eq!(options.step_quota, 10);
/// assert_eq!(options.stop_before, Some(Stage::GenerateCode));
/// assert!(!options.may_run);
/// # Ok::<_, stagehand::ConfigurationError>(())
/// ```
///
/// See [Build::with_options][crate::Build::with_options].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Options {
    /// The number of stages each module may advance through in one build.
    pub step_quota: usize,
    /// Permit modules to advance to [`Stage::Run`].
    pub may_run: bool,
    /// Stop every module one stage short of this stage.
    pub stop_before: Option<Stage>,
    /// Extension of source files.
    pub source_extension: String,
    /// Name of the file which marks a library root.
    pub configuration_file: String,
    /// Libraries which are provided from outside of the scanned tree and
    /// reused as long as their identity doesn't change.
    #[serde(deserialize_with = "deserialize_library_names")]
    pub external_libraries: Vec<LibraryName>,
}

fn deserialize_library_names<'de, D>(deserializer: D) -> Result<Vec<LibraryName>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let names = Vec::<String>::deserialize(deserializer)?;

    names
        .iter()
        .map(|name| LibraryName::new(name).map_err(serde::de::Error::custom))
        .collect()
}

impl Options {
    /// Load options from a TOML document, such as the contents of a
    /// `stagehand.toml` file.
    pub fn from_toml(document: &str) -> Result<Self, ConfigurationError> {
        Ok(toml::from_str(document)?)
    }

    /// Parse a build option. This is the function which parses the
    /// `<option>[=<value>]` syntax, used by the `-O` flag of the command line
    /// interface.
    ///
    /// # Examples
    ///
    /// ```
    /// use stagehand::Options;
    ///
    /// let mut options = Options::default();
    /// options.parse_option("may-run")?;
    /// options.parse_option("step-quota=20")?;
    ///
    /// assert!(options.may_run);
    /// assert_eq!(options.step_quota, 20);
    /// assert!(options.parse_option("optimize").is_err());
    /// # Ok::<_, stagehand::ParseOptionError>(())
    /// ```
    pub fn parse_option(&mut self, option: &str) -> Result<(), ParseOptionError> {
        let (head, tail) = if let Some((head, tail)) = option.split_once('=') {
            (head, Some(tail))
        } else {
            (option, None)
        };

        let invalid = |reason: &dyn fmt::Display| ParseOptionError {
            option: option.into(),
            reason: Some(reason.to_string().into()),
        };

        match head {
            "step-quota" => {
                let tail = tail.ok_or_else(|| invalid(&"expected a number"))?;
                self.step_quota = tail.parse().map_err(|error| invalid(&error))?;
            }
            "may-run" => {
                self.may_run = tail.map_or(true, |s| s == "true");
            }
            "stop-before" => {
                self.stop_before = match tail {
                    None | Some("") => None,
                    Some(stage) => Some(stage.parse().map_err(|error| invalid(&error))?),
                };
            }
            "source-extension" => {
                let tail = tail.ok_or_else(|| invalid(&"expected an extension"))?;
                self.source_extension = tail.trim_start_matches('.').to_owned();
            }
            "configuration-file" => {
                let tail = tail.ok_or_else(|| invalid(&"expected a file name"))?;
                self.configuration_file = tail.to_owned();
            }
            "external-libraries" => {
                let tail = tail.unwrap_or_default();

                self.external_libraries = tail
                    .split(',')
                    .filter(|name| !name.is_empty())
                    .map(LibraryName::new)
                    .collect::<Result<_, _>>()
                    .map_err(|error| invalid(&error))?;
            }
            _ => {
                return Err(ParseOptionError {
                    option: option.into(),
                    reason: None,
                });
            }
        }

        Ok(())
    }

    /// Set if modules may advance to the run stage. Defaults to `false`.
    pub fn may_run(&mut self, enabled: bool) {
        self.may_run = enabled;
    }

    /// Set the per-module step quota. Defaults to `1000`.
    pub fn step_quota(&mut self, quota: usize) {
        self.step_quota = quota;
    }

    /// Test if a file name is a source file.
    pub(crate) fn is_source_file(&self, name: &str) -> bool {
        name.rsplit_once('.')
            .map_or(false, |(stem, ext)| !stem.is_empty() && ext == self.source_extension)
    }

    /// Test if the library is provided from outside of the scanned tree.
    pub(crate) fn is_external(&self, name: &LibraryName) -> bool {
        self.external_libraries.contains(name)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            step_quota: 1_000,
            may_run: false,
            stop_before: None,
            source_extension: String::from("st"),
            configuration_file: String::from("config.st"),
            external_libraries: vec![LibraryName::standard()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Options;
    use crate::stage::Stage;

    #[test]
    fn parse_options() {
        let mut options = Options::default();
        options.parse_option("stop-before=export").unwrap();
        options.parse_option("source-extension=.src").unwrap();
        options.parse_option("external-libraries=std,shared").unwrap();

        assert_eq!(options.stop_before, Some(Stage::Export));
        assert!(options.is_source_file("a.src"));
        assert!(!options.is_source_file(".src"));
        assert!(!options.is_source_file("a.st"));
        assert_eq!(options.external_libraries.len(), 2);

        let error = options.parse_option("step-quota=many").unwrap_err();
        assert!(error.to_string().starts_with("Invalid build option `step-quota=many`"));
    }

    #[test]
    fn deserialize_defaults() {
        let options = Options::from_toml("may-run = true").unwrap();
        assert!(options.may_run);
        assert_eq!(options.step_quota, 1_000);
        assert_eq!(options.configuration_file, "config.st");

        assert!(Options::from_toml("external-libraries = [\"not a name\"]").is_err());
    }
}
