//! Common type definitions for Vigil proxy.
//!
//! This module provides shared type definitions used throughout the platform,
//! with a focus on type safety and operational clarity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Load balancing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingAlgorithm {
    #[default]
    RoundRobin,
    LeastRequest,
    Random,
}

impl fmt::Display for LoadBalancingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::LeastRequest => write!(f, "least_request"),
            Self::Random => write!(f, "random"),
        }
    }
}
