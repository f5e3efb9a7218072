use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarveyError {
    #[error("http Error {source:?}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("serde_json Error {source:?}")]
    SerdeJson {
        #[from]
        source: serde_json::Error,
    },

    #[error("io Error {source:?}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("line decoding Error {source:?}")]
    Lines {
        #[from]
        source: tokio_util::codec::LinesCodecError,
    },

    #[error("store returned {status}: {body}")]
    Store { status: u16, body: String },

    #[error("unexpected store response: {0}")]
    UnexpectedResponse(String),

    #[error("not an N-Triples statement: {0}")]
    InvalidTriple(String),

    #[error("no input file found for task <{0}>")]
    NoInputFile(String),

    #[error("no input graph found for task <{0}>")]
    NoInputGraph(String),

    #[error("no vendor associated with the job of task <{0}>")]
    NoVendor(String),

    #[error("giving up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        source: Box<HarveyError>,
    },

    #[error("triple could not be inserted: {triple} ({source})")]
    UninsertableTriple {
        triple: String,
        source: Box<HarveyError>,
    },

    #[error("triple could not be deleted: {triple} ({source})")]
    UndeletableTriple {
        triple: String,
        source: Box<HarveyError>,
    },

    #[error("task run cancelled after exceeding its time limit")]
    Cancelled,
}
