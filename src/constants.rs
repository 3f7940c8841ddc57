//! Physical and instrumental constants.
//!
//! Physical constants are plain `const`s. Instrument geometry is gathered in
//! [`InstrumentConstants`], which is passed explicitly to every component that
//! needs it so unit conversions stay visible at the call site.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Planck constant [J s]
pub const PLANCK: f64 = 6.626_070_15e-34;

/// Speed of light in vacuum [m/s]
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Definition of the kilorayleigh [photons/steradian], 10^9 / (4 pi)
pub const KILORAYLEIGH: f64 = 1.0e9 / (4.0 * PI);

/// Number of detector pixels along each axis of an IUVS detector
pub const DETECTOR_PIXELS: usize = 1024;

/// Mean Mars-Sun distance [AU]
pub const MARS_SEMI_MAJOR_AXIS_AU: f64 = 1.523_679_34;

/// Optical and detector geometry of the IUVS telescope and spectrograph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConstants {
    /// Size of a detector pixel [mm]
    #[serde(rename = "pixelSize")]
    pub pixel_size_mm: f64,
    /// Focal length of the telescope mirror [mm]
    #[serde(rename = "focalLength")]
    pub focal_length_mm: f64,
    /// Width of the spectrograph slit [mm]
    #[serde(rename = "slitWidth")]
    pub slit_width_mm: f64,
    /// Saturation level of a CMOS detector pixel [DN]
    #[serde(rename = "pixelWellDepth")]
    pub pixel_well_depth_dn: f64,
    /// Mirror angle limits of a nominal scan [degrees]
    #[serde(rename = "mirrorAngleMin")]
    pub mirror_angle_min_deg: f64,
    #[serde(rename = "mirrorAngleMax")]
    pub mirror_angle_max_deg: f64,
}

impl Default for InstrumentConstants {
    fn default() -> Self {
        Self {
            pixel_size_mm: 0.023438,
            focal_length_mm: 100.0,
            slit_width_mm: 0.1,
            pixel_well_depth_dn: 3400.0,
            mirror_angle_min_deg: 30.0,
            mirror_angle_max_deg: 150.0,
        }
    }
}

impl InstrumentConstants {
    /// Solid angle subtended by one detector pixel [sr].
    ///
    /// One pixel along the slit times the slit width across it, both divided
    /// by the focal length.
    pub fn pixel_solid_angle(&self) -> f64 {
        self.pixel_size_mm / self.focal_length_mm * self.slit_width_mm / self.focal_length_mm
    }

    /// Solid angle of a spatial bin spanning `spatial_bin_width` detector pixels
    pub fn bin_solid_angle(&self, spatial_bin_width: usize) -> f64 {
        self.pixel_solid_angle() * spatial_bin_width as f64
    }

    /// Number of finite mirror angles outside the nominal scan range
    pub fn angles_outside_scan(&self, mirror_angles: &[f64]) -> usize {
        let scan = self.mirror_angle_min_deg..=self.mirror_angle_max_deg;
        mirror_angles
            .iter()
            .filter(|angle| angle.is_finite() && !scan.contains(*angle))
            .count()
    }

    /// Saturation threshold of a binned sample [DN]
    pub fn saturation_threshold(&self, spatial_bin_width: usize, spectral_bin_width: usize) -> f64 {
        self.pixel_well_depth_dn * spatial_bin_width as f64 * spectral_bin_width as f64
    }
}

/// Factor converting irradiance [W/m²/nm] at wavelength `wavelength_nm` to
/// photon brightness [kR/nm]
pub fn watts_to_kilorayleigh_factor(wavelength_nm: f64) -> f64 {
    wavelength_nm * 1e-9 / (PLANCK * SPEED_OF_LIGHT) * 4.0 * PI * 1e-10 / 1000.0
}
