// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::GrayImage;
use log::{info, warn};

use crate::astro_util::pixels_to_celestial;
use crate::constellation::{identify_constellations, ConstellationLookup};
use crate::pattern_match::{MatchResult, PatternMatcher};
use crate::solver_trait::{PlateSolver, SolveFailure, SolveResult};
use crate::star_detect::{detect_stars, ImageCoord};

/// How a field attribution was reached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttributionMethod {
    /// Remote plate solution, coordinate mapping and boundary lookup.
    PlateSolve,
    /// Geometric template matching on raw pixel positions.
    PatternMatch,
}

/// Outcome of a full pipeline run. `constellation` is None when neither the
/// vote nor the pattern matcher produced a name.
#[derive(Debug)]
pub struct FieldAttribution {
    pub stars: Vec<ImageCoord>,
    pub constellation: Option<String>,
    pub votes: Vec<(String, usize)>,
    pub matched_pairs: Vec<((f64, f64), (f64, f64))>,
    pub method: AttributionMethod,
    /// The failure that diverted the run to pattern matching, if any.
    pub solve_failure: Option<SolveFailure>,
}

/// Runs the full attribution pipeline on one image: star detection, plate
/// solving, then coordinate mapping and the constellation vote, falling
/// back to geometric pattern matching whenever the solve path cannot
/// deliver. Always completes with an attribution; solver unavailability is
/// reported in the result, never raised.
pub async fn attribute_field(image: &GrayImage, image_png: &[u8],
                             detect_threshold: u8,
                             solver: &dyn PlateSolver,
                             lookup: &dyn ConstellationLookup,
                             matcher: &dyn PatternMatcher)
                             -> FieldAttribution {
    let (width, height) = image.dimensions();
    let stars = detect_stars(image, detect_threshold);
    info!("Detected {} stars", stars.len());

    let mut solve_failure = None;
    match solver.solve_image(image_png).await {
        SolveResult::Solved(calibration) => {
            info!("Plate solved: center ({:.4}, {:.4}), {:.3} arcsec/pixel",
                  calibration.ra, calibration.dec, calibration.pixscale);
            match pixels_to_celestial(&stars, &calibration, width, height)
                .and_then(|coords| identify_constellations(&coords, lookup))
            {
                Ok((majority, votes)) => {
                    return FieldAttribution{
                        stars,
                        constellation: majority,
                        votes,
                        matched_pairs: Vec::new(),
                        method: AttributionMethod::PlateSolve,
                        solve_failure: None,
                    };
                }
                Err(e) => {
                    warn!("Attribution via plate solution failed ({:?}); \
                           falling back to pattern matching", e);
                }
            }
        }
        SolveResult::Failed(failure) => {
            warn!("Plate solving failed ({}); falling back to pattern matching",
                  failure);
            solve_failure = Some(failure);
        }
    }

    let (constellation, matched_pairs) =
        match matcher.match_field(&stars, width, height) {
            MatchResult::Matched{name, pairs} => (Some(name), pairs),
            MatchResult::NoMatch => (None, Vec::new()),
        };
    FieldAttribution{
        stars,
        constellation,
        votes: Vec::new(),
        matched_pairs,
        method: AttributionMethod::PatternMatch,
        solve_failure,
    }
}
