mod character;
mod constraint;
mod motion;

pub use character::*;
pub use constraint::*;
pub use motion::*;

#[cfg(test)]
pub(crate) mod testutil;


#[cfg(test)]
mod constraint_tests;
