//! Concrete moment models.
pub mod linear;

pub use linear::{LinearContainer, LinearMomentSpecification};
