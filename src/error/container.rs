//! Errors that carry the program location at which they arose.

use std::fmt::Formatter;

use thiserror::Error;

use crate::program::Location;

/// An error raised while executing the instruction at `location`.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    pub location: Location,
    pub payload:  E,
}

impl<E> std::fmt::Display for Located<E>
where
    E: std::fmt::Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.location, self.payload)
    }
}

/// Values that can be tagged with the program location they arose at.
pub trait Locatable
where
    Self: Sized,
{
    /// The type of the tagged value.
    type Located;

    /// Tags the value with `location`.
    fn locate(self, location: Location) -> Self::Located;
}

/// Tags the error of a result, leaving a success untouched.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, location: Location) -> Self::Located {
        self.map_err(|payload| Located { location, payload })
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::{
            container::Locatable,
            execution::Error,
        },
        program::{Location, MethodId},
    };

    #[test]
    fn locates_only_the_error_of_a_result() {
        let location = Location::new(MethodId::new(2), 3);
        let failed: Result<(), Error> = Err(Error::FellOffMethod);
        let located = failed.locate(location).expect_err("Result was not an error");
        assert_eq!(located.location, location);
        assert_eq!(located.payload, Error::FellOffMethod);

        let passed: Result<u8, Error> = Ok(7);
        assert_eq!(passed.locate(location), Ok(7));
    }

    #[test]
    fn displays_the_location_before_the_error() {
        let located = Error::NoSuchFrame.locate(Location::new(MethodId::new(0), 5));
        assert_eq!(
            located.to_string(),
            format!("[{}]: {}", Location::new(MethodId::new(0), 5), Error::NoSuchFrame)
        );
    }
}
