//! Collaborator seams: location lookup and reverse geocoding.

pub mod geo;

pub use geo::{Describer, Locator, coordinate_label, label_location};
