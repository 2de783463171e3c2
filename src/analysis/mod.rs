//! APIs for static analysis.

pub mod fixed_point;
