use std::fmt;

/// Failures that abort a whole build. No partial document is returned.
#[derive(Debug)]
pub enum BuildError {
    Io(std::io::Error),
    Decode(String),
    UnsupportedTransform(String),
    UnresolvedLocation(String),
    /// A network location could not be fetched.
    Fetch(String),
    InvalidConfiguration(String),
    Stopped,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Io(err) => write!(f, "io error: {}", err),
            BuildError::Decode(message) => write!(f, "markup decode error: {}", message),
            BuildError::UnsupportedTransform(function) => {
                write!(f, "unsupported transform function: {}", function)
            }
            BuildError::UnresolvedLocation(location) => {
                write!(f, "cannot resolve document location: {}", location)
            }
            BuildError::Fetch(message) => write!(f, "fetch failed: {}", message),
            BuildError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            BuildError::Stopped => write!(f, "builder was stopped"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BuildError {
    fn from(value: std::io::Error) -> Self {
        BuildError::Io(value)
    }
}

/// Failures local to one element. The dispatcher drops the element, records a
/// diagnostic and keeps going.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementError {
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    InvalidNumber {
        element: String,
        attribute: String,
        value: String,
    },
    InvalidColor(String),
    InvalidReference {
        element: String,
        value: String,
    },
    UnexpectedContent {
        element: String,
    },
}

impl fmt::Display for ElementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementError::MissingAttribute { element, attribute } => {
                write!(f, "<{}> is missing required attribute '{}'", element, attribute)
            }
            ElementError::InvalidNumber {
                element,
                attribute,
                value,
            } => write!(
                f,
                "<{}> attribute '{}' is not a number: '{}'",
                element, attribute, value
            ),
            ElementError::InvalidColor(value) => write!(f, "invalid color: '{}'", value),
            ElementError::InvalidReference { element, value } => {
                write!(f, "<{}> has an unusable reference: '{}'", element, value)
            }
            ElementError::UnexpectedContent { element } => {
                write!(f, "<{}> is not followed by character data", element)
            }
        }
    }
}

impl std::error::Error for ElementError {}

/// Outcome of handling one element: either a recoverable element failure or a
/// fatal build failure that must unwind the whole pass.
#[derive(Debug)]
pub(crate) enum HandlerError {
    Element(ElementError),
    Fatal(BuildError),
}

impl From<ElementError> for HandlerError {
    fn from(value: ElementError) -> Self {
        HandlerError::Element(value)
    }
}

impl From<BuildError> for HandlerError {
    fn from(value: BuildError) -> Self {
        HandlerError::Fatal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_source() {
        let err: BuildError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("io error"));
    }

    #[test]
    fn element_errors_name_the_attribute() {
        let err = ElementError::MissingAttribute {
            element: "rect".to_string(),
            attribute: "width",
        };
        assert_eq!(err.to_string(), "<rect> is missing required attribute 'width'");
    }
}
