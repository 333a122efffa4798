use core::fmt::Debug;

pub trait Error: Debug {
    fn kind(&self) -> ErrorKind;
}

/// Device error kind that can be used across clock and register implementations
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The function is unimplemented
    Unimplemented,
    /// No divider reproduces the requested rate from any parent
    Unsatisfiable,
    /// A divider, PLL multiplier or register field is outside what the hardware can hold
    OutOfRange,
    /// Register access failed
    Io,
    /// The hardware did not latch a new configuration
    Busy,
    /// The hardware did not reach the expected state in time
    Timeout,
    /// No clock exists at the given index
    InvalidClock,
    /// The clock has no parent of the requested kind
    NoParent,
}

impl Error for core::convert::Infallible {
    fn kind(&self) -> ErrorKind {
        match *self {}
    }
}

impl Error for ErrorKind {
    fn kind(&self) -> ErrorKind {
        *self
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unimplemented => write!(f, "The function is unimplemented"),
            Self::Unsatisfiable => write!(f, "No valid divider for the requested rate"),
            Self::OutOfRange => write!(f, "Value out of hardware range"),
            Self::Io => write!(f, "Register access failed"),
            Self::Busy => write!(f, "Configuration update did not complete"),
            Self::Timeout => write!(f, "Timed out waiting for hardware"),
            Self::InvalidClock => write!(f, "No such clock"),
            Self::NoParent => write!(f, "Clock has no such parent"),
        }
    }
}

pub trait ErrorType {
    /// Error type
    type Error: Error;
}

impl<T: ErrorType> ErrorType for &mut T {
    type Error = T::Error;
}
