use canonical_error::{CanonicalError, out_of_range_error};

use crate::solver_trait::Calibration;
use crate::star_detect::ImageCoord;

/// A position on the celestial sphere. Both angles are in degrees; `ra` is
/// kept in [0, 360), `dec` in [-90, 90].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CelestialCoord {
    pub ra: f64,
    pub dec: f64,
}

/// Declination beyond which the flat-field RA offset is numerically
/// unusable (cos(dec) approaches zero).
pub const MAX_MAPPABLE_DEC: f64 = 89.9;

/// Wraps a right ascension value in degrees into [0, 360).
pub fn wrap_ra_deg(ra: f64) -> f64 {
    ra.rem_euclid(360.0)
}

/// Returns the separation, in radians, between the given celestial coordinates
/// (in radians).
pub fn angular_separation(p0_ra: f64, p0_dec: f64,
                          p1_ra: f64, p1_dec: f64) -> f64 {
    (p0_dec.sin() * p1_dec.sin() +
     p0_dec.cos() * p1_dec.cos() * (p0_ra - p1_ra).cos()).acos()
}

/// Converts detected star positions to celestial coordinates using the plate
/// solution for their image.
///
/// This is a flat small-field approximation: offsets from the image center
/// scale linearly with the solved pixel scale, with the RA axis stretched by
/// 1/cos(dec). Valid near the image center for narrow fields of view; no
/// correction is applied for field curvature or rotation.
///
/// Output is order-preserving, one coordinate per input star. Returns an
/// OutOfRange error when the solved field center is within 0.1 degree of a
/// celestial pole, where the RA stretch diverges.
pub fn pixels_to_celestial(stars: &[ImageCoord], calibration: &Calibration,
                           width: u32, height: u32)
                           -> Result<Vec<CelestialCoord>, CanonicalError> {
    if calibration.dec.abs() > MAX_MAPPABLE_DEC {
        return Err(out_of_range_error(
            format!("Field center dec {:.4} is too close to a celestial pole",
                    calibration.dec).as_str()));
    }
    let pixscale_deg = calibration.pixscale / 3600.0;
    let cos_dec = calibration.dec.to_radians().cos();
    Ok(stars.iter().map(|star| {
        let ra_offset = (star.x - width as f64 / 2.0) * pixscale_deg / cos_dec;
        let dec_offset = (star.y - height as f64 / 2.0) * pixscale_deg;
        CelestialCoord{
            ra: wrap_ra_deg(calibration.ra + ra_offset),
            dec: (calibration.dec + dec_offset).clamp(-90.0, 90.0),
        }
    }).collect())
}
