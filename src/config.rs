//! The run configuration.
//!
//! The configuration file is a YAML (the traditional `ldndc2nc.conf`) or TOML
//! document with four sections, kept in the order they are written:
//!
//! - `info` and `project`: free-form key/value metadata, merged into the global
//!   attributes of the output netCDF files,
//! - `variables`: a mapping of LandscapeDNDC output file type (the file name
//!   suffix, e.g. `soilchemistry-daily.txt`) to the list of variables to take
//!   from those files, in the grammar described in [`crate::variable`],
//! - `refdata`: the reference grid file and the name of its cell id variable.
//!
//! A minimal YAML example:
//!
//! ```yaml
//! info:
//!   author: Jane Doe
//! variables:
//!   soilchemistry-daily.txt:
//!     - dN_n2o_emis[kgNha-1]
//!     - dN_n_emis[kgNha-1]=dN_n2o_emis[kgNha-1]+dN_no_emis[kgNha-1]
//! refdata:
//!   file: cellid.nc
//!   var: cid
//! ```
//!
//! Any other top level section is rejected when the file is loaded.
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use error_stack::ResultExt;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{aggregate::VariablePlan, error::ConfigError, variable::VariableSpec};

/// Name of the configuration file looked for in the default locations. This
/// is also the name `--store-config` writes.
pub const CONFIG_FILE_NAME: &str = "ldndc2nc.conf";
/// Environmental variable that may point to a configuration file.
pub const CONFIG_ENV_VAR: &str = "LDNDC2NC_CONF";
/// System-wide configuration directory.
pub const SYSTEM_CONFIG_DIR: &str = "/etc/ldndc2nc";

/// The recognized configuration sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Section {
    Info,
    Project,
    Variables,
    Refdata,
}

/// A borrowed view of one configuration section, returned by [`Config::section`].
#[derive(Debug, Clone, Copy)]
pub enum SectionData<'a> {
    Info(&'a IndexMap<String, MetaValue>),
    Project(&'a IndexMap<String, MetaValue>),
    Variables(&'a IndexMap<String, Vec<VariableSpec>>),
    Refdata(Option<&'a RefData>),
}

/// A metadata value from the `info` or `project` sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Int(i) => write!(f, "{i}"),
            MetaValue::Float(v) => write!(f, "{v}"),
            MetaValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// The reference grid: a netCDF file with `lat`/`lon` coordinates and an
/// integer cell id variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefData {
    pub file: PathBuf,
    pub var: String,
}

/// Configuration for one conversion run.
///
/// Normally loaded with [`Config::from_file`], which also validates the
/// variable declarations. If deserialized some other way, call
/// [`Config::validate`] before using it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, alias = "INFO", alias = "Info", deserialize_with = "null_as_default")]
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub info: IndexMap<String, MetaValue>,

    #[serde(default, alias = "PROJECT", alias = "Project", deserialize_with = "null_as_default")]
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub project: IndexMap<String, MetaValue>,

    /// File type pattern to the ordered variables taken from files of that type.
    #[serde(default, alias = "VARIABLES", alias = "Variables", deserialize_with = "null_as_default")]
    pub variables: IndexMap<String, Vec<VariableSpec>>,

    #[serde(default, alias = "REFDATA", alias = "Refdata")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refdata: Option<RefData>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Config {
    /// Load a configuration file.
    ///
    /// Files ending in `.toml` are read as TOML. Anything else is read as
    /// YAML first and, if that does not parse, as TOML, so a TOML document
    /// saved as `ldndc2nc.conf` is accepted as well.
    pub fn from_file(path: &Path) -> error_stack::Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(vec![path.to_path_buf()]).into());
        }

        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::CouldNotRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let res = if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml_str(&text)
        } else {
            match Self::from_yaml_str(&text) {
                Err(yaml_err) if matches!(yaml_err.current_context(), ConfigError::Invalid(_)) => {
                    Self::from_toml_str(&text).map_err(|toml_err| {
                        debug!("Configuration is not valid TOML either: {toml_err}");
                        yaml_err
                    })
                }
                res => res,
            }
        };
        res.attach_printable_lazy(|| format!("configuration file: {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> error_stack::Result<Self, ConfigError> {
        let config: Config = toml::from_str(s).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(s: &str) -> error_stack::Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(s).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that there is something to convert and that the variable
    /// declarations are unambiguous.
    pub fn validate(&self) -> error_stack::Result<(), ConfigError> {
        if self.variables.is_empty() {
            return Err(ConfigError::NoVariables.into());
        }

        if let Some((file_type, _)) = self.variables.iter().find(|(_, vars)| vars.is_empty()) {
            return Err(ConfigError::EmptyFileType(file_type.to_string()).into());
        }

        VariablePlan::new(&self.variables).change_context(ConfigError::InvalidVariables)?;
        Ok(())
    }

    /// Return the data of one section by name. Names are case-insensitive;
    /// anything other than info, project, variables or refdata is an error.
    pub fn section(&self, name: &str) -> Result<SectionData<'_>, ConfigError> {
        let section = Section::from_str(name)
            .map_err(|_| ConfigError::UnknownSection(name.to_lowercase()))?;
        Ok(match section {
            Section::Info => SectionData::Info(&self.info),
            Section::Project => SectionData::Project(&self.project),
            Section::Variables => SectionData::Variables(&self.variables),
            Section::Refdata => SectionData::Refdata(self.refdata.as_ref()),
        })
    }

    /// All declared variables across file types, in declaration order.
    pub fn all_variables(&self) -> Vec<&VariableSpec> {
        self.variables.values().flatten().collect()
    }

    /// The `info` and `project` metadata merged into one map, with `project`
    /// entries taking precedence.
    pub fn global_info(&self) -> IndexMap<String, MetaValue> {
        let mut global_info = IndexMap::new();
        for (section_name, section) in [("info", &self.info), ("project", &self.project)] {
            if section.is_empty() {
                warn!("No <{section_name}> data found in config");
            }
            global_info.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        global_info
    }

    /// Serialize to TOML; composite variables are written in their full
    /// `target=src1+src2` form so the output can be loaded again.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Serialize to YAML, the traditional `ldndc2nc.conf` layout.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Write this configuration as YAML to [`CONFIG_FILE_NAME`] in `dest_dir`
    /// and return the path written. Stored in the home directory, it is
    /// picked up by [`find_config`] on later runs.
    pub fn write_to_dir(&self, dest_dir: &Path) -> error_stack::Result<PathBuf, ConfigError> {
        let path = dest_dir.join(CONFIG_FILE_NAME);
        let text = self.to_yaml_string()?;
        std::fs::write(&path, text).map_err(|e| ConfigError::CouldNotWrite {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }
}

/// The user's home directory, from `$HOME`.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// The locations searched for a configuration file, in priority order.
pub fn config_search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    search_paths(explicit, home_dir(), std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
}

fn search_paths(explicit: Option<&Path>, home: Option<PathBuf>, env_path: Option<PathBuf>) -> Vec<PathBuf> {
    let mut locations = vec![];
    if let Some(p) = explicit {
        locations.push(p.to_path_buf());
    }
    locations.push(PathBuf::from(".").join(CONFIG_FILE_NAME));
    if let Some(home) = home {
        locations.push(home.join(CONFIG_FILE_NAME));
    }
    locations.push(PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME));
    if let Some(env_path) = env_path {
        locations.push(env_path);
    }
    locations
}

fn first_existing(locations: Vec<PathBuf>) -> Result<PathBuf, ConfigError> {
    match locations.iter().find(|p| p.is_file()) {
        Some(p) => Ok(p.clone()),
        None => Err(ConfigError::NotFound(locations)),
    }
}

/// Find the configuration file to use.
///
/// An explicitly given path must exist; otherwise the first existing file of
/// [`config_search_paths`] is returned.
pub fn find_config(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(p) => first_existing(vec![p.to_path_buf()]),
        None => first_existing(config_search_paths(None)),
    }
}
