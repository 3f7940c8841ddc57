//! Conversion of dayside counts to radiance and reflectance (I/F).

use crate::core::calibration_curve::CalibrationCurve;
use crate::core::flatfield::Flatfield;
use crate::core::gain::voltage_correction;
use crate::types::{IuvsError, IuvsResult};
use ndarray::{Array2, Array3, ArrayView1, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Detector corrections and geometry cuts used for reflectance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectanceOptions {
    #[serde(rename = "applyFlatfield")]
    pub apply_flatfield: bool,
    #[serde(rename = "applyVoltageCorrection")]
    pub apply_voltage_correction: bool,
    /// Pixels whose line of sight passes higher than this are off the disk [km]
    #[serde(rename = "maxTangentAltitudeKm")]
    pub max_tangent_altitude_km: f64,
}

impl Default for ReflectanceOptions {
    fn default() -> Self {
        Self {
            apply_flatfield: true,
            apply_voltage_correction: true,
            max_tangent_altitude_km: 0.0,
        }
    }
}

/// Viewing geometry of every (integration, spatial bin) pixel
#[derive(Debug, Clone)]
pub struct PixelGeometry {
    /// Solar zenith angle [degrees]
    pub solar_zenith_angle: Array2<f64>,
    /// Tangent altitude of the line of sight [km]; absent means every pixel
    /// is on the disk
    pub tangent_altitude: Option<Array2<f64>>,
}

impl PixelGeometry {
    pub fn new(solar_zenith_angle: Array2<f64>) -> Self {
        Self {
            solar_zenith_angle,
            tangent_altitude: None,
        }
    }

    pub fn with_tangent_altitude(mut self, tangent_altitude: Array2<f64>) -> Self {
        self.tangent_altitude = Some(tangent_altitude);
        self
    }

    pub fn dim(&self) -> (usize, usize) {
        self.solar_zenith_angle.dim()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReflectanceCalculator {
    options: ReflectanceOptions,
}

impl ReflectanceCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ReflectanceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReflectanceOptions {
        &self.options
    }

    /// Pixels that look at the planet. NaN tangent altitudes count as off
    /// the disk.
    pub fn on_disk_mask(&self, geometry: &PixelGeometry) -> IuvsResult<Array2<bool>> {
        match &geometry.tangent_altitude {
            None => Ok(Array2::from_elem(geometry.dim(), true)),
            Some(altitude) => {
                if altitude.dim() != geometry.dim() {
                    return Err(IuvsError::ShapeMismatch(format!(
                        "Tangent altitude {:?} does not match solar zenith angle {:?}",
                        altitude.dim(),
                        geometry.dim()
                    )));
                }
                let limit = self.options.max_tangent_altitude_km;
                Ok(altitude.mapv(|alt| alt <= limit))
            }
        }
    }

    /// Radiance [kR] from dark-subtracted counts [DN].
    ///
    /// Counts are divided by the flatfield (when given and enabled), scaled by
    /// the MCP voltage correction and divided by the calibration curve.
    pub fn radiance(
        &self,
        counts: ArrayView3<f64>,
        calibration: &CalibrationCurve,
        voltage: f64,
        flatfield: Option<&Flatfield>,
    ) -> IuvsResult<Array3<f64>> {
        let (_, n_spatial, n_spectral) = counts.dim();
        if calibration.len() != n_spectral {
            return Err(IuvsError::ShapeMismatch(format!(
                "Calibration curve has {} bins, data has {}",
                calibration.len(),
                n_spectral
            )));
        }

        let mut corrected = match flatfield {
            Some(ff) if self.options.apply_flatfield => ff.apply(counts)?,
            _ => counts.to_owned(),
        };
        log::debug!("Converting {} positions x {} bins to radiance", n_spatial, n_spectral);

        let gain = if self.options.apply_voltage_correction {
            voltage_correction(voltage)
        } else {
            1.0
        };
        let curve = calibration.values();
        for mut frame in corrected.axis_iter_mut(Axis(0)) {
            for mut spectrum in frame.axis_iter_mut(Axis(0)) {
                Zip::from(&mut spectrum).and(curve).for_each(|value, &c| {
                    *value = if c.is_finite() && c > 0.0 {
                        *value * gain / c
                    } else {
                        f64::NAN
                    };
                });
            }
        }
        Ok(corrected)
    }

    /// Reflectance `radiance * pi / cos(sza) / solar_flux`.
    ///
    /// NaN where the sun is at or below the horizon, the pixel is off the
    /// disk, or the solar flux of the bin is not positive.
    pub fn reflectance_from_radiance(
        &self,
        radiance: ArrayView3<f64>,
        solar_flux: ArrayView1<f64>,
        geometry: &PixelGeometry,
    ) -> IuvsResult<Array3<f64>> {
        let shape = radiance.dim();
        if (shape.0, shape.1) != geometry.dim() {
            return Err(IuvsError::ShapeMismatch(format!(
                "Radiance {:?} does not match geometry {:?}",
                shape,
                geometry.dim()
            )));
        }
        if solar_flux.len() != shape.2 {
            return Err(IuvsError::ShapeMismatch(format!(
                "Solar flux has {} bins, radiance has {}",
                solar_flux.len(),
                shape.2
            )));
        }

        let on_disk = self.on_disk_mask(geometry)?;
        let broadcast_error = || IuvsError::ShapeMismatch(format!("Cannot broadcast inputs to {:?}", shape));
        let sza_view = geometry.solar_zenith_angle.view().insert_axis(Axis(2));
        let sza = sza_view.broadcast(shape).ok_or_else(broadcast_error)?;
        let disk_view = on_disk.view().insert_axis(Axis(2));
        let disk = disk_view.broadcast(shape).ok_or_else(broadcast_error)?;
        let flux = solar_flux.broadcast(shape).ok_or_else(broadcast_error)?;

        let kernel = |&rad: &f64, &angle: &f64, &bin_flux: &f64, &visible: &bool| -> f64 {
            if !visible || !(angle < 90.0) || !(bin_flux.is_finite() && bin_flux > 0.0) {
                return f64::NAN;
            }
            rad * PI / angle.to_radians().cos() / bin_flux
        };

        #[cfg(feature = "parallel")]
        let reflectance = Zip::from(&radiance).and(&sza).and(&flux).and(&disk).par_map_collect(kernel);
        #[cfg(not(feature = "parallel"))]
        let reflectance = Zip::from(&radiance).and(&sza).and(&flux).and(&disk).map_collect(kernel);

        let valid = reflectance.iter().filter(|v| v.is_finite()).count();
        log::info!(
            "Reflectance computed: {} of {} samples defined",
            valid,
            reflectance.len()
        );
        Ok(reflectance)
    }

    /// Reflectance (I/F) straight from dark-subtracted counts
    pub fn to_reflectance(
        &self,
        counts: ArrayView3<f64>,
        calibration: &CalibrationCurve,
        solar_flux: ArrayView1<f64>,
        geometry: &PixelGeometry,
        voltage: f64,
        flatfield: Option<&Flatfield>,
    ) -> IuvsResult<Array3<f64>> {
        let radiance = self.radiance(counts, calibration, voltage, flatfield)?;
        self.reflectance_from_radiance(radiance.view(), solar_flux, geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    fn unit_curve(n: usize) -> CalibrationCurve {
        CalibrationCurve::new(Array1::ones(n), 2)
    }

    fn no_corrections() -> ReflectanceCalculator {
        ReflectanceCalculator::with_options(ReflectanceOptions {
            apply_voltage_correction: false,
            ..ReflectanceOptions::default()
        })
    }

    #[test]
    fn test_reflectance_at_normal_incidence() {
        let radiance = Array3::from_elem((1, 2, 3), 2.0);
        let flux = array![1.0, 2.0, PI];
        let geometry = PixelGeometry::new(array![[0.0, 60.0]]);

        let rf = no_corrections()
            .reflectance_from_radiance(radiance.view(), flux.view(), &geometry)
            .unwrap();
        assert_relative_eq!(rf[[0, 0, 0]], 2.0 * PI, max_relative = 1e-12);
        assert_relative_eq!(rf[[0, 0, 2]], 2.0, max_relative = 1e-12);
        assert_relative_eq!(rf[[0, 1, 0]], 4.0 * PI, max_relative = 1e-12);
    }

    #[test]
    fn test_night_and_off_disk_pixels_are_nan() {
        let radiance = Array3::from_elem((2, 2, 1), 1.0);
        let flux = array![1.0];
        let geometry = PixelGeometry::new(array![[30.0, 90.0], [f64::NAN, 45.0]])
            .with_tangent_altitude(array![[0.0, 0.0], [0.0, 120.0]]);

        let rf = no_corrections()
            .reflectance_from_radiance(radiance.view(), flux.view(), &geometry)
            .unwrap();
        assert!(rf[[0, 0, 0]].is_finite());
        assert!(rf[[0, 1, 0]].is_nan());
        assert!(rf[[1, 0, 0]].is_nan());
        assert!(rf[[1, 1, 0]].is_nan());
    }

    #[test]
    fn test_non_positive_flux_gives_nan() {
        let radiance = Array3::from_elem((1, 1, 2), 1.0);
        let geometry = PixelGeometry::new(array![[10.0]]);
        let rf = no_corrections()
            .reflectance_from_radiance(radiance.view(), array![0.0, f64::NAN].view(), &geometry)
            .unwrap();
        assert!(rf.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_radiance_applies_flatfield_then_voltage_then_curve() {
        let counts = Array3::from_elem((1, 2, 2), 12.0);
        let ff = Flatfield::new(array![[2.0, 3.0], [4.0, 6.0]], vec![200.0, 210.0]).unwrap();
        let curve = CalibrationCurve::new(array![2.0, 1.0], 2);

        let radiance = ReflectanceCalculator::new()
            .radiance(counts.view(), &curve, 700.0, Some(&ff))
            .unwrap();
        let vc = voltage_correction(700.0);
        assert_relative_eq!(radiance[[0, 0, 0]], 12.0 / 2.0 * vc / 2.0, max_relative = 1e-12);
        assert_relative_eq!(radiance[[0, 1, 1]], 12.0 / 6.0 * vc / 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_shape_checks() {
        let counts = Array3::from_elem((1, 2, 3), 1.0);
        assert!(no_corrections().radiance(counts.view(), &unit_curve(2), 0.0, None).is_err());

        let geometry = PixelGeometry::new(Array2::zeros((1, 3)));
        assert!(no_corrections()
            .reflectance_from_radiance(counts.view(), Array1::ones(3).view(), &geometry)
            .is_err());
    }
}
