// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use log::debug;

use crate::star_detect::ImageCoord;

/// A canonical relative layout of a constellation's notable stars, with
/// points normalized to [0,1]x[0,1].
pub struct ShapeTemplate {
    pub name: &'static str,
    pub points: &'static [(f64, f64)],
}

/// Template catalog. Matching iterates in this order; first match wins.
pub static TEMPLATES: [ShapeTemplate; 3] = [
    // Belt: three stars in a tight line.
    ShapeTemplate{name: "Orion", points: &[
        (0.5, 0.5), (0.52, 0.5), (0.54, 0.5),
    ]},
    // Big Dipper: rough bowl-and-handle shape.
    ShapeTemplate{name: "Ursa Major", points: &[
        (0.3, 0.3), (0.35, 0.25), (0.4, 0.2), (0.45, 0.25),
        (0.5, 0.3), (0.55, 0.35), (0.6, 0.4),
    ]},
    // Little Dipper.
    ShapeTemplate{name: "Ursa Minor", points: &[
        (0.7, 0.2), (0.72, 0.18), (0.74, 0.15), (0.76, 0.12),
        (0.78, 0.1), (0.8, 0.08), (0.82, 0.05),
    ]},
];

/// Default per-axis match tolerance in normalized units.
pub const MATCH_TOLERANCE: f64 = 0.05;

/// Outcome of a pattern match attempt. `pairs` associates each matched
/// normalized star position with its template point.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchResult {
    Matched {
        name: String,
        pairs: Vec<((f64, f64), (f64, f64))>,
    },
    NoMatch,
}

/// Matching strategy over raw pixel positions plus image dimensions; no
/// calibration is involved. Total: never fails, a miss is the NoMatch
/// value. This seam exists so the subset search below can be swapped for a
/// geometric-hashing matcher at larger star counts.
pub trait PatternMatcher {
    fn match_field(&self, stars: &[ImageCoord], width: u32, height: u32)
                   -> MatchResult;
}

/// Reference matcher: depth-first search over order-preserving subsets of
/// the normalized star list, pruning a subtree as soon as a template point
/// has no candidate within tolerance. Equivalent to enumerating all C(n, k)
/// index combinations, so the worst case is combinatorial; keep this to
/// demo-scale fields.
pub struct SubsetMatcher {
    /// Per-axis tolerance window (independent in x and y).
    pub tolerance: f64,
}

impl Default for SubsetMatcher {
    fn default() -> Self {
        SubsetMatcher{tolerance: MATCH_TOLERANCE}
    }
}

impl SubsetMatcher {
    // Extends a partial pairing: template[depth] may pair with any star at
    // index >= start, keeping subset order aligned with star order.
    fn search(&self, stars: &[(f64, f64)], template: &[(f64, f64)],
              depth: usize, start: usize, chosen: &mut Vec<usize>) -> bool {
        if depth == template.len() {
            return true;
        }
        // Leave room for the remaining template points.
        let last_start = stars.len() - (template.len() - depth);
        for index in start..=last_start {
            let (sx, sy) = stars[index];
            let (tx, ty) = template[depth];
            if (sx - tx).abs() < self.tolerance &&
                (sy - ty).abs() < self.tolerance
            {
                chosen.push(index);
                if self.search(stars, template, depth + 1, index + 1, chosen) {
                    return true;
                }
                chosen.pop();
            }
        }
        false
    }
}

impl PatternMatcher for SubsetMatcher {
    fn match_field(&self, stars: &[ImageCoord], width: u32, height: u32)
                   -> MatchResult {
        let normalized: Vec<(f64, f64)> = stars.iter()
            .map(|s| (s.x / width as f64, s.y / height as f64))
            .collect();
        for template in &TEMPLATES {
            if normalized.len() < template.points.len() {
                continue;
            }
            let mut chosen = Vec::with_capacity(template.points.len());
            if self.search(&normalized, template.points, 0, 0, &mut chosen) {
                debug!("Matched template {} with star indices {:?}",
                       template.name, chosen);
                let pairs = chosen.iter().zip(template.points.iter())
                    .map(|(&index, &point)| (normalized[index], point))
                    .collect();
                return MatchResult::Matched{
                    name: template.name.to_string(), pairs};
            }
        }
        MatchResult::NoMatch
    }
}
