//! Sampling parameters as an inert data record. Execution of the sampling
//! algorithm itself (top-k/top-p, temperature scaling) is out of scope here;
//! this crate only carries the parameters through admission and transport.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    /// <= 0 disables top-k filtering.
    pub top_k: i32,
    pub top_p: f32,
    pub ignore_eos: bool,
    pub max_tokens: i32,
}

impl SamplingParams {
    pub fn new(temperature: f32, top_k: i32, top_p: f32, ignore_eos: bool, max_tokens: i32) -> Self {
        Self { temperature, top_k, top_p, ignore_eos, max_tokens }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { temperature: 1.0, top_k: -1, top_p: 1.0, ignore_eos: false, max_tokens: 16 }
    }
}
