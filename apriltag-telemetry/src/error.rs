/// The error type for detection, publishing and configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("could not open source {descriptor}: {reason}")]
    SourceUnavailable { descriptor: String, reason: String },
    #[error("error reading frame: {0}")]
    SourceRead(String),
    #[error("tag detector error: {0}")]
    Detector(String),
    #[error("could not publish telemetry: {0}")]
    Publish(String),
    #[error("frame sink error: {0}")]
    Sink(String),
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDe {
        #[from]
        source: toml::de::Error,
    },
    #[error("TOML serialization error: {source}")]
    TomlSer {
        #[from]
        source: toml::ser::Error,
    },
    #[error("CBOR error: {source}")]
    Cbor {
        #[from]
        source: serde_cbor::Error,
    },
    #[error("y4m error: {source}")]
    Y4m {
        #[from]
        source: y4m::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
