use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    Image(image::ImageError),
    /// Token rejected or caller lacks rights on the content.
    Unauthorized(String),
    /// Malformed request: bad identifier, bad image payload, bad parameters.
    InvalidInput(String),
    NotFound(String),
    /// Drawing failed; the document is discarded.
    Render(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Image(e) => write!(f, "image error: {e}"),
            Error::Unauthorized(msg) => write!(f, "{msg}"),
            Error::InvalidInput(msg) => write!(f, "{msg}"),
            Error::NotFound(msg) => write!(f, "{msg}"),
            Error::Render(msg) => write!(f, "PDF generation failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e)
    }
}
