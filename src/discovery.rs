//! Turns the Grendel host inventory into Prometheus target groups.
mod grendel;
mod targetgroup;

pub use grendel::{Discoverer, Error, JOB_NAME, ParseError, SOURCE, parse_hosts};
pub use targetgroup::TargetGroup;
