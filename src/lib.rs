// Core modules of the luna pre-processor.
pub mod args;
pub mod diag;
pub mod env;
pub mod generate;
pub mod lock;
pub mod probe;
pub mod route;
pub mod ssh_config;
pub mod wrapper;
pub mod zone;

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Zone(zone::ZoneError),
    Route(route::UnknownName),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Zone(err) => write!(f, "Zone configuration error: {}", err),
            Error::Route(err) => write!(f, "Routing error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

// Implement From for each error type
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<zone::ZoneError> for Error {
    fn from(err: zone::ZoneError) -> Self {
        Error::Zone(err)
    }
}

impl From<route::UnknownName> for Error {
    fn from(err: route::UnknownName) -> Self {
        Error::Route(err)
    }
}
