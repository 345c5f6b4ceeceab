//! Memory-driven horizontal autoscaling: the replica calculator and the
//! controller that reconciles autoscaler objects.

pub mod autoscaler;
pub mod error;
pub mod replica_calculator;

#[cfg(test)]
mod fake;
