use std::fmt::Display;

use ldndc2nc::error::PipelineError;

#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// The program was called incorrectly, e.g. a required option is missing
    UsageError(String),

    /// A problem with the configuration or the input data, such as a missing
    /// file type or a cell id absent from the reference grid
    InputError(String),

    /// A problem with the system rather than the inputs, e.g. an output file
    /// that could not be written
    RuntimeError(String),
}

impl CliError {
    pub(crate) fn usage_error<S: ToString>(msg: S) -> Self {
        Self::UsageError(msg.to_string())
    }

    pub(crate) fn input_error<S: ToString>(msg: S) -> Self {
        Self::InputError(msg.to_string())
    }

    pub(crate) fn runtime_error<S: ToString>(msg: S) -> Self {
        Self::RuntimeError(msg.to_string())
    }

    /// A suggestion for the user on how to address this kind of error.
    pub(crate) fn user_message(&self) -> &'static str {
        match self {
            CliError::UsageError(_) => "Please double check the command line arguments; run with --help to see the available options.",
            CliError::InputError(_) => "Please check the configuration file and the input files referenced in the error above; the cause listed at the bottom of the error stack is usually the place to start.",
            CliError::RuntimeError(_) => "This may be a problem with your system rather than the inputs, for example missing write permission in the output directory. Fix it and run the conversion again.",
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (type_str, msg) = match self {
            CliError::UsageError(msg) => ("Usage error", msg),
            CliError::InputError(msg) => ("Input error", msg),
            CliError::RuntimeError(msg) => ("Runtime error", msg),
        };
        write!(f, "{type_str}: {msg}")
    }
}

impl From<&PipelineError> for CliError {
    fn from(value: &PipelineError) -> Self {
        match value {
            PipelineError::Writing(_) => CliError::runtime_error(value),
            _ => CliError::input_error(value),
        }
    }
}
