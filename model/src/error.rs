use snafu::Snafu;

#[derive(Debug, Snafu)]
pub struct Error(OpaqueError);
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum OpaqueError {
    #[snafu(display("Invalid test name pattern '{}': {}", pattern, source))]
    NamePattern {
        pattern: String,
        source: regex::Error,
    },

    #[snafu(display("Parse error: {}", source))]
    SerdePlain { source: serde_plain::Error },

    #[snafu(display("Error serializing report: {}", source))]
    ReportSerialization { source: serde_json::Error },
}
