use thiserror::Error as ThisError;

/// Simpler take on
/// <https://docs.rs/itertools/latest/itertools/trait.Itertools.html#method.exactly_one>, used to
/// pick the one device, configuration, interface or endpoint that matches.
pub trait ExactlyOneIter: Iterator {
    fn exactly_one(&mut self) -> Result<Self::Item, ExactlyOneError> {
        match (self.next(), self.next()) {
            (None, _) => Err(ExactlyOneError::Zero),
            (Some(item), None) => Ok(item),
            (Some(_), Some(_)) => Err(ExactlyOneError::MoreThanOne),
        }
    }
}

impl<T> ExactlyOneIter for T where T: Iterator {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum ExactlyOneError {
    #[error("no match found")]
    Zero,
    #[error("more than one match found")]
    MoreThanOne,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one() {
        assert_eq!([7].into_iter().exactly_one(), Ok(7));
        assert_eq!(
            core::iter::empty::<u8>().exactly_one(),
            Err(ExactlyOneError::Zero)
        );
        assert_eq!(
            (0..3).filter(|n| n % 2 == 0).exactly_one(),
            Err(ExactlyOneError::MoreThanOne)
        );
    }
}
