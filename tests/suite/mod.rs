//! Integration test modules

mod claims;
mod exclusivity;
mod lifecycle;
mod notifications;
mod payments;
