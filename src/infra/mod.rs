//! HTTP implementations of the location collaborators.

pub mod ipapi;
pub mod nominatim;

#[cfg(test)]
pub(crate) mod canned;

pub use ipapi::IpApiLocator;
pub use nominatim::NominatimDescriber;
