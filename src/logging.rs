use std::path::Path;

use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

use crate::error::WriteError;

const CONSOLE_PATTERN: &str = "{h({d(%Y-%m-%d %H:%M:%S)} [{l}] from line {L} in {M})} - {m}{n}";
const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] {M} - {m}{n}";

/// Set up logging to stderr and, if `log_file` is given, to that file as well.
pub fn init_logging(level: log::LevelFilter, log_file: Option<&Path>) -> error_stack::Result<(), WriteError> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .target(Target::Stderr)
        .build();

    let mut builder = Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root = Root::builder().appender("stderr");

    if let Some(path) = log_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
            .append(false)
            .build(path)
            .map_err(|e| WriteError::context(format!("opening log file {}: {e}", path.display())))?;
        builder = builder.appender(Appender::builder().build("logfile", Box::new(file)));
        root = root.appender("logfile");
    }

    let config = builder
        .build(root.build(level))
        .map_err(|e| WriteError::context(format!("configuring the logger: {e}")))?;

    log4rs::init_config(config)
        .map_err(|e| WriteError::context(format!("initializing the logger: {e}")))?;
    Ok(())
}
