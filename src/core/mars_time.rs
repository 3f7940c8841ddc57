//! Martian calendar quantities derived from UTC timestamps.
//!
//! Solar longitude follows Allison (1997, GRL 24, 1967), the heliocentric
//! distance follows Allison & McEwen (2000, PSS 48, 215). Mars years are
//! counted in the Clancy et al. convention.

use crate::constants::MARS_SEMI_MAJOR_AXIS_AU;
use chrono::{DateTime, Utc};

const UNIX_EPOCH_JULIAN_DATE: f64 = 2_440_587.5;
const J2000_JULIAN_DATE: f64 = 2_451_545.0;
const MARS_YEAR_REFERENCE_JULIAN_DATE: f64 = 2_442_765.667;
const MARS_YEAR_REFERENCE: f64 = 12.0;
const SOLS_PER_MARS_YEAR: f64 = 668.6;
const SECONDS_PER_EARTH_DAY: f64 = 86_400.0;
const SECONDS_PER_SOL: f64 = 88_775.245;

/// A moment in time expressed in Martian terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarsTime {
    julian_date: f64,
}

impl MarsTime {
    pub fn from_utc(time: DateTime<Utc>) -> Self {
        let seconds = time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) * 1e-9;
        Self::from_julian_date(seconds / SECONDS_PER_EARTH_DAY + UNIX_EPOCH_JULIAN_DATE)
    }

    pub fn from_julian_date(julian_date: f64) -> Self {
        Self { julian_date }
    }

    pub fn julian_date(&self) -> f64 {
        self.julian_date
    }

    fn days_since_j2000(&self) -> f64 {
        self.julian_date - J2000_JULIAN_DATE
    }

    fn sols_since_reference(&self) -> f64 {
        (self.julian_date - MARS_YEAR_REFERENCE_JULIAN_DATE) * SECONDS_PER_EARTH_DAY / SECONDS_PER_SOL
    }

    /// Sol of the current Mars year
    pub fn sol(&self) -> f64 {
        self.sols_since_reference().rem_euclid(SOLS_PER_MARS_YEAR)
    }

    pub fn fractional_mars_year(&self) -> f64 {
        self.sols_since_reference() / SOLS_PER_MARS_YEAR + MARS_YEAR_REFERENCE
    }

    pub fn whole_mars_year(&self) -> i64 {
        self.fractional_mars_year().floor() as i64
    }

    /// Areocentric solar longitude Ls [degrees, 0-360)
    pub fn solar_longitude(&self) -> f64 {
        let dt = self.days_since_j2000();
        let m = (19.41 + 0.524_021_2 * dt).to_radians();
        let alpha = 270.39 + 0.524_038_4 * dt;
        let ls = alpha
            + (10.691 + 3.7e-7 * dt) * m.sin()
            + 0.623 * (2.0 * m).sin()
            + 0.05 * (3.0 * m).sin()
            + 0.005 * (4.0 * m).sin();
        ls.rem_euclid(360.0)
    }

    /// Mars-Sun distance [AU]
    pub fn sun_distance_au(&self) -> f64 {
        let m = (19.3871 + 0.524_020_73 * self.days_since_j2000()).to_radians();
        MARS_SEMI_MAJOR_AXIS_AU
            * (1.00436 - 0.09309 * m.cos() - 0.00436 * (2.0 * m).cos() - 0.00031 * (3.0 * m).cos())
    }
}

/// Mars-Sun distance [AU] at `time`
pub fn mars_sun_distance_au(time: DateTime<Utc>) -> f64 {
    MarsTime::from_utc(time).sun_distance_au()
}
