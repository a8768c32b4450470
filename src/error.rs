//! Crate-wide error type.
//!
//! Device and audio collaborators, parameter validation and the spectrum
//! path all report through [`Error`]. Only [`Error::Fatal`] is meant to end
//! the process; everything else leaves the pipeline retryable.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Capture files and other byte sources
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Receiver driver: enumeration, open or configuration failure
    #[error("Device error: {0}")]
    Device(String),

    /// Audio device or stream failure
    #[error("Audio error: {0}")]
    Audio(String),

    /// Unknown I/Q sample format name
    #[error("Format error: {0}")]
    Format(String),

    /// A runtime parameter outside its accepted range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Sample block shorter than the configured FFT size
    #[error("Insufficient samples: need {needed}, got {available}")]
    InsufficientSamples { needed: usize, available: usize },

    /// Resampler construction or processing error
    #[error("Resampler error: {0}")]
    Resampler(String),

    /// The pipeline has not finished initializing
    #[error("Pipeline not ready")]
    NotReady,

    /// Unrecoverable failure after a successful initialization
    #[error("Fatal: {0}")]
    Fatal(String),

    /// Driver status from SoapySDR
    #[cfg(feature = "soapy")]
    #[error("SoapySDR error: {0}")]
    SoapySdr(#[from] soapysdr::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl Error {
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Error::Device(msg.into())
    }

    pub fn audio<S: Into<String>>(msg: S) -> Self {
        Error::Audio(msg.into())
    }

    pub fn format<S: Into<String>>(msg: S) -> Self {
        Error::Format(msg.into())
    }

    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Error::InvalidParameter(msg.into())
    }

    pub fn fatal<S: Into<String>>(msg: S) -> Self {
        Error::Fatal(msg.into())
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Whether the error must halt the process rather than leave the
    /// pipeline in a retryable state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}
