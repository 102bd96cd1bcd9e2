//! Rate governor for continuous sources.
//!
//! Decimation is a fixed rule over the nominal source rate:
//! `skip = max(1, floor(source_fps / target_fps))`, and input frame `i` is kept
//! iff `i % skip == 0`. Arrival jitter is ignored and frames are never invented,
//! so a source slower than the target keeps every frame.

use anyhow::Result;

use crate::{pipeline_error, ErrorKind};

/// Derive the skip interval from the nominal source rate and the target rate.
pub fn skip_interval(source_fps: f64, target_fps: f64) -> Result<u64> {
    if !target_fps.is_finite() || target_fps <= 0.0 {
        return Err(pipeline_error(
            ErrorKind::Configuration,
            format!("target rate must be positive, got {}", target_fps),
        ));
    }
    if !source_fps.is_finite() || source_fps <= 0.0 {
        return Err(pipeline_error(
            ErrorKind::Source,
            format!("source rate must be positive, got {}", source_fps),
        ));
    }
    let ratio = (source_fps / target_fps).floor();
    if ratio < 1.0 {
        return Ok(1);
    }
    Ok(ratio as u64)
}

/// Stateless keep decision for input frame `input_index`.
pub fn should_keep(source_fps: f64, target_fps: f64, input_index: u64) -> Result<bool> {
    let skip = skip_interval(source_fps, target_fps)?;
    Ok(input_index % skip == 0)
}

/// Per-run governor state: rates, derived skip and a running input counter.
#[derive(Clone, Debug)]
pub struct RateGovernor {
    source_fps: f64,
    target_fps: f64,
    skip: u64,
    seen: u64,
    kept: u64,
}

impl RateGovernor {
    pub fn new(source_fps: f64, target_fps: f64) -> Result<Self> {
        let skip = skip_interval(source_fps, target_fps)?;
        log::info!(
            "RateGovernor: source {:.2} fps, target {:.2} fps, keeping 1 of every {} frames",
            source_fps,
            target_fps,
            skip
        );
        Ok(Self {
            source_fps,
            target_fps,
            skip,
            seen: 0,
            kept: 0,
        })
    }

    /// Observe the next input frame and decide whether it is kept.
    pub fn observe(&mut self) -> bool {
        let keep = self.seen % self.skip == 0;
        self.seen += 1;
        if keep {
            self.kept += 1;
        }
        keep
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn source_fps(&self) -> f64 {
        self.source_fps
    }

    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    /// Input frames observed so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Input frames kept so far.
    pub fn kept(&self) -> u64 {
        self.kept
    }
}
