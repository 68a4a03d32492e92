// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use canonical_error::CanonicalError;
use log::debug;

use crate::astro_util::{angular_separation, CelestialCoord};

/// Maps a celestial coordinate to the name of the constellation containing
/// it. The built-in implementation is a coarse lookup table; a
/// network-backed catalog service can be substituted behind this trait, with
/// its availability failures surfaced through the error channel.
pub trait ConstellationLookup {
    fn constellation_containing(&self, coord: &CelestialCoord)
                                -> Result<String, CanonicalError>;
}

// Approximate RA/Dec extent of a constellation. `ra_min` > `ra_max` denotes
// a range wrapping through RA 0.
struct SkyBounds {
    name: &'static str,
    ra_min: f64,
    ra_max: f64,
    dec_min: f64,
    dec_max: f64,
}

impl SkyBounds {
    fn contains(&self, coord: &CelestialCoord) -> bool {
        if coord.dec < self.dec_min || coord.dec > self.dec_max {
            return false;
        }
        if self.ra_min <= self.ra_max {
            coord.ra >= self.ra_min && coord.ra <= self.ra_max
        } else {
            coord.ra >= self.ra_min || coord.ra <= self.ra_max
        }
    }

    fn center(&self) -> CelestialCoord {
        let ra_span = if self.ra_min <= self.ra_max {
            self.ra_max - self.ra_min
        } else {
            self.ra_max + 360.0 - self.ra_min
        };
        CelestialCoord{
            ra: (self.ra_min + ra_span / 2.0).rem_euclid(360.0),
            dec: (self.dec_min + self.dec_max) / 2.0,
        }
    }
}

// Coarse boxes for prominent constellations, rounded to whole degrees.
// These are not the IAU boundary polygons; where boxes overlap, the earlier
// entry wins.
static BOUNDS: [SkyBounds; 10] = [
    SkyBounds{name: "Orion",
              ra_min: 67.0, ra_max: 95.0, dec_min: -11.0, dec_max: 23.0},
    SkyBounds{name: "Taurus",
              ra_min: 49.0, ra_max: 90.0, dec_min: 0.0, dec_max: 31.0},
    SkyBounds{name: "Ursa Major",
              ra_min: 118.0, ra_max: 217.0, dec_min: 28.0, dec_max: 73.0},
    SkyBounds{name: "Ursa Minor",
              ra_min: 195.0, ra_max: 345.0, dec_min: 65.0, dec_max: 90.0},
    SkyBounds{name: "Cassiopeia",
              ra_min: 343.0, ra_max: 30.0, dec_min: 46.0, dec_max: 77.0},
    SkyBounds{name: "Lyra",
              ra_min: 271.0, ra_max: 285.0, dec_min: 25.0, dec_max: 48.0},
    SkyBounds{name: "Cygnus",
              ra_min: 289.0, ra_max: 330.0, dec_min: 27.0, dec_max: 61.0},
    SkyBounds{name: "Scorpius",
              ra_min: 236.0, ra_max: 267.0, dec_min: -45.0, dec_max: -8.0},
    SkyBounds{name: "Leo",
              ra_min: 140.0, ra_max: 180.0, dec_min: -6.0, dec_max: 33.0},
    SkyBounds{name: "Crux",
              ra_min: 180.0, ra_max: 195.0, dec_min: -64.0, dec_max: -55.0},
];

/// Coarse containment lookup over the table above. Total: a coordinate
/// outside every box resolves to the nearest box center by angular
/// separation.
pub struct BoundsTable;

impl BoundsTable {
    pub fn new() -> Self {
        BoundsTable
    }
}

impl Default for BoundsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstellationLookup for BoundsTable {
    fn constellation_containing(&self, coord: &CelestialCoord)
                                -> Result<String, CanonicalError> {
        if let Some(bounds) = BOUNDS.iter().find(|b| b.contains(coord)) {
            return Ok(bounds.name.to_string());
        }
        let mut best = &BOUNDS[0];
        let mut best_sep = f64::MAX;
        for bounds in &BOUNDS {
            let center = bounds.center();
            let sep = angular_separation(
                coord.ra.to_radians(), coord.dec.to_radians(),
                center.ra.to_radians(), center.dec.to_radians());
            if sep < best_sep {
                best_sep = sep;
                best = bounds;
            }
        }
        Ok(best.name.to_string())
    }
}

/// Running tally of constellation assignments. Names keep their insertion
/// order, which makes the majority winner deterministic under ties.
#[derive(Clone, Debug, Default)]
pub struct ConstellationVote {
    entries: Vec<(String, usize)>,
}

impl ConstellationVote {
    pub fn record(&mut self, name: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((name.to_string(), 1)),
        }
    }

    /// The name with the highest count. Ties resolve to the name recorded
    /// earliest, not alphabetically.
    pub fn majority(&self) -> Option<&str> {
        let mut winner: Option<(&str, usize)> = None;
        for (name, count) in &self.entries {
            match winner {
                Some((_, best)) if *count <= best => {}
                _ => winner = Some((name, *count)),
            }
        }
        winner.map(|(name, _)| name)
    }

    pub fn counts(&self) -> &[(String, usize)] {
        &self.entries
    }

    pub fn into_counts(self) -> Vec<(String, usize)> {
        self.entries
    }
}

/// Classifies each coordinate via `lookup` and returns the majority
/// constellation (None for empty input) together with the full tally, one
/// increment per coordinate.
pub fn identify_constellations(coords: &[CelestialCoord],
                               lookup: &dyn ConstellationLookup)
                               -> Result<(Option<String>, Vec<(String, usize)>),
                                         CanonicalError> {
    let mut vote = ConstellationVote::default();
    for coord in coords {
        vote.record(&lookup.constellation_containing(coord)?);
    }
    debug!("Vote tally: {:?}", vote.counts());
    let majority = vote.majority().map(|name| name.to_string());
    Ok((majority, vote.into_counts()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment() {
        let table = BoundsTable::new();
        let orion = CelestialCoord{ra: 83.0, dec: 5.0};
        assert_eq!(table.constellation_containing(&orion).unwrap(), "Orion");
        let lyra = CelestialCoord{ra: 278.0, dec: 36.0};
        assert_eq!(table.constellation_containing(&lyra).unwrap(), "Lyra");
    }

    #[test]
    fn test_containment_across_ra_wrap() {
        let table = BoundsTable::new();
        let coord = CelestialCoord{ra: 10.0, dec: 60.0};
        assert_eq!(table.constellation_containing(&coord).unwrap(),
                   "Cassiopeia");
        let coord = CelestialCoord{ra: 350.0, dec: 60.0};
        assert_eq!(table.constellation_containing(&coord).unwrap(),
                   "Cassiopeia");
    }

    #[test]
    fn test_uncovered_coordinate_falls_back_to_nearest() {
        let table = BoundsTable::new();
        // South of the Orion box; Orion's center is still the closest.
        let coord = CelestialCoord{ra: 83.0, dec: -40.0};
        assert_eq!(table.constellation_containing(&coord).unwrap(), "Orion");
    }

    #[test]
    fn test_majority_prefers_higher_count() {
        let mut vote = ConstellationVote::default();
        vote.record("Lyra");
        vote.record("Cygnus");
        vote.record("Cygnus");
        assert_eq!(vote.majority(), Some("Cygnus"));
    }

    #[test]
    fn test_tie_resolves_to_first_recorded() {
        // Alternating Orion/Lyra coordinates, three votes each. Orion's
        // tally key is created first, so Orion must win the tie even though
        // Lyra sorts first alphabetically.
        let table = BoundsTable::new();
        let orion = CelestialCoord{ra: 83.0, dec: 5.0};
        let lyra = CelestialCoord{ra: 278.0, dec: 36.0};
        let coords = [orion, lyra, orion, lyra, orion, lyra];
        let (majority, tally) =
            identify_constellations(&coords, &table).unwrap();
        assert_eq!(majority.as_deref(), Some("Orion"));
        assert_eq!(tally, vec![("Orion".to_string(), 3),
                               ("Lyra".to_string(), 3)]);
    }

    #[test]
    fn test_empty_input() {
        let table = BoundsTable::new();
        let (majority, tally) = identify_constellations(&[], &table).unwrap();
        assert_eq!(majority, None);
        assert!(tally.is_empty());
    }
}
