//! Local network inspection.

mod vantage;

pub use vantage::{InterfaceLocator, VantageLocator, locate_in};

#[cfg(test)]
pub use vantage::tests::StaticLocator;
