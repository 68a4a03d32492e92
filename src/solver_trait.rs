// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Astrometric solution for a single image: the sky position of the image
/// center plus the pixel scale. Produced only by a successful plate solve;
/// immutable thereafter.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Calibration {
    /// Right ascension of the image center, degrees.
    pub ra: f64,
    /// Declination of the image center, degrees.
    pub dec: f64,
    /// Pixel scale, arcseconds per pixel.
    pub pixscale: f64,
}

/// Why a plate solve attempt produced no calibration. Each variant carries a
/// brief cause suitable for user-facing reporting.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveFailure {
    /// Credential rejected, or malformed login response.
    Auth(String),
    /// Image upload rejected, or malformed upload response.
    Submission(String),
    /// Network-level failure at any phase.
    Transport(String),
    /// The job completed without a usable calibration (unsolvable image).
    Calibration(String),
    /// No job was assigned to the submission within the solve timeout.
    TimedOut(String),
    /// cancel() was invoked while waiting on the remote service.
    Cancelled(String),
}

impl fmt::Display for SolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveFailure::Auth(msg) =>
                write!(f, "authentication failed: {}", msg),
            SolveFailure::Submission(msg) =>
                write!(f, "submission failed: {}", msg),
            SolveFailure::Transport(msg) =>
                write!(f, "transport error: {}", msg),
            SolveFailure::Calibration(msg) =>
                write!(f, "no calibration: {}", msg),
            SolveFailure::TimedOut(msg) =>
                write!(f, "timed out: {}", msg),
            SolveFailure::Cancelled(msg) =>
                write!(f, "cancelled: {}", msg),
        }
    }
}

/// Outcome of one plate solve attempt. Exactly one of these is produced per
/// solve_image() invocation; failures are folded into the Failed variant and
/// never escape as errors.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveResult {
    Solved(Calibration),
    Failed(SolveFailure),
}

/// A plate solver turns raw image bytes into a Calibration.
///
/// Implementations own all of their per-attempt state (session, submission
/// and job identifiers); a single instance must not be shared between images
/// being solved concurrently.
#[async_trait]
pub trait PlateSolver {
    /// Note: can block for up to the full solve timeout while the remote
    /// service works on the image.
    async fn solve_image(&self, image: &[u8]) -> SolveResult;

    /// Requests that the current solve_image() operation, if any, terminate
    /// soon with SolveFailure::Cancelled. Returns without waiting for the
    /// cancel to take effect.
    fn cancel(&self);

    /// Returns the solve timeout used when none is configured.
    fn default_timeout(&self) -> Duration;
}
