//!
//! Error kinds surfaced by the storage engine and the graph layered on top
//!
//! Stream failures and exhausted growth are recoverable by the caller in the
//! sense that the store stays consistent; invariant violations (double free,
//! corrupt free-list chain, tree level out of range) indicate a bug or
//! external corruption and panic instead of returning.
//!

use std::fmt;
use std::io;
use std::result;


#[derive(Debug)]
pub enum Error {
    /// The backing stream failed; the heap on top of it is no longer usable
    Io(io::Error),

    /// The stream refused to grow far enough to satisfy an allocation
    OutOfSpace { requested: u64 },

    /// Persisted state failed validation when it was opened
    Corrupt(&'static str),

    /// Min or max was asked of an empty collection
    EmptyCollection,

    /// Indexer-style access to a key that is not present
    KeyNotFound(String),
}

pub type Result<T> = result::Result<T, Error>;


impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) =>
                write!(f, "stream i/o failure: {}", e),

            Error::OutOfSpace { requested } =>
                write!(f, "out of space; could not grow stream to {} bytes", requested),

            Error::Corrupt(what) =>
                write!(f, "corrupt store: {}", what),

            Error::EmptyCollection =>
                write!(f, "min/max of an empty collection"),

            Error::KeyNotFound(ref key) =>
                write!(f, "key not found: {}", key),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::KeyNotFound("Author".to_string());
        assert_eq!(format!("{}", e), "key not found: Author");

        let e = Error::OutOfSpace { requested: 4096 };
        assert!(format!("{}", e).contains("4096"));
    }

    #[test]
    fn test_from_io() {
        let io = io::Error::new(io::ErrorKind::Other, "boom");
        match Error::from(io) {
            Error::Io(_) => (),
            other => panic!("expected Io, got {:?}", other),
        }
    }
}
