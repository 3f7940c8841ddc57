//! Pipeline configuration.
//!
//! Every component has its own options struct with sensible defaults;
//! [`PipelineConfig`] bundles them and can be read from an XML document:
//!
//! ```xml
//! <pipelineConfig>
//!   <instrument><pixelSize>0.023438</pixelSize></instrument>
//!   <swath><thresholdFactor>2.5</thresholdFactor></swath>
//!   <reflectance><maxTangentAltitudeKm>0</maxTangentAltitudeKm></reflectance>
//!   <nightside>
//!     <templates><template>no_nightglow</template><template>co2p_uvd</template></templates>
//!   </nightside>
//! </pipelineConfig>
//! ```
//!
//! Missing elements keep their default values.

use crate::constants::InstrumentConstants;
use crate::core::pipeline::NightsideOptions;
use crate::core::reflectance::ReflectanceOptions;
use crate::core::solar_flux::SolarFluxOptions;
use crate::core::swath::SwathOptions;
use crate::types::{IuvsError, IuvsResult};
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename = "pipelineConfig")]
pub struct PipelineConfig {
    pub instrument: InstrumentConstants,
    pub swath: SwathOptions,
    #[serde(rename = "solarFlux")]
    pub solar_flux: SolarFluxOptions,
    pub reflectance: ReflectanceOptions,
    pub nightside: NightsideOptions,
}

impl PipelineConfig {
    /// Parse an XML configuration document
    pub fn from_xml_str(xml: &str) -> IuvsResult<Self> {
        let config: PipelineConfig =
            from_str(xml).map_err(|e| IuvsError::XmlParsing(format!("Failed to parse pipeline config: {}", e)))?;
        config.validate()?;
        log::debug!("Loaded pipeline configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_xml_file<P: AsRef<Path>>(path: P) -> IuvsResult<Self> {
        let path = path.as_ref();
        log::info!("Reading pipeline configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_xml_str(&content)
    }

    /// Reject settings that would make processing meaningless
    pub fn validate(&self) -> IuvsResult<()> {
        let instrument = &self.instrument;
        for (name, value) in [
            ("pixelSize", instrument.pixel_size_mm),
            ("focalLength", instrument.focal_length_mm),
            ("slitWidth", instrument.slit_width_mm),
            ("pixelWellDepth", instrument.pixel_well_depth_dn),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(IuvsError::Config(format!("{} must be positive, got {}", name, value)));
            }
        }
        if !(instrument.mirror_angle_min_deg < instrument.mirror_angle_max_deg) {
            return Err(IuvsError::Config(format!(
                "Mirror angle range [{}, {}] is empty",
                instrument.mirror_angle_min_deg, instrument.mirror_angle_max_deg
            )));
        }
        if !(self.swath.threshold_factor.is_finite() && self.swath.threshold_factor > 0.0) {
            return Err(IuvsError::Config(format!(
                "Swath threshold factor must be positive, got {}",
                self.swath.threshold_factor
            )));
        }
        if !(self.swath.reversal_fraction.is_finite() && self.swath.reversal_fraction >= 0.0) {
            return Err(IuvsError::Config(format!(
                "Swath reversal fraction must be non-negative, got {}",
                self.swath.reversal_fraction
            )));
        }
        if !(self.solar_flux.absolute_tolerance > 0.0 && self.solar_flux.relative_tolerance >= 0.0) {
            return Err(IuvsError::Config(
                "Solar flux tolerances must be positive".to_string(),
            ));
        }
        if self.nightside.templates.names.is_empty() {
            return Err(IuvsError::Config("No nightside templates configured".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::templates::{CO2P_UVD, NO_NIGHTGLOW, STANDARD_FIT_TEMPLATES};

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.swath.threshold_factor, 2.0);
        assert_eq!(config.instrument.pixel_well_depth_dn, 3400.0);
        assert_eq!(config.nightside.templates.names, STANDARD_FIT_TEMPLATES.map(String::from).to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_xml_keeps_defaults() {
        let xml = r#"
            <pipelineConfig>
                <instrument><slitWidth>0.2</slitWidth></instrument>
                <swath><thresholdFactor>3.5</thresholdFactor></swath>
                <nightside>
                    <templates>
                        <template>no_nightglow</template>
                        <template>co2p_uvd</template>
                    </templates>
                    <maskSaturated>false</maskSaturated>
                </nightside>
            </pipelineConfig>
        "#;
        let config = PipelineConfig::from_xml_str(xml).unwrap();
        assert_eq!(config.instrument.slit_width_mm, 0.2);
        assert_eq!(config.instrument.focal_length_mm, 100.0);
        assert_eq!(config.swath.threshold_factor, 3.5);
        assert!(config.swath.split_on_reversal);
        assert_eq!(config.nightside.templates.names, vec![NO_NIGHTGLOW, CO2P_UVD]);
        assert!(!config.nightside.mask_saturated);
        assert_eq!(config.reflectance.max_tangent_altitude_km, 0.0);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let xml = "<pipelineConfig><swath><thresholdFactor>-1</thresholdFactor></swath></pipelineConfig>";
        assert!(matches!(PipelineConfig::from_xml_str(xml), Err(IuvsError::Config(_))));

        let xml = "<pipelineConfig><instrument><mirrorAngleMin>160</mirrorAngleMin></instrument></pipelineConfig>";
        assert!(matches!(PipelineConfig::from_xml_str(xml), Err(IuvsError::Config(_))));

        let xml = "<pipelineConfig><swath><reversalFraction>-0.5</reversalFraction></swath></pipelineConfig>";
        assert!(matches!(PipelineConfig::from_xml_str(xml), Err(IuvsError::Config(_))));

        let malformed = "<pipelineConfig><swath><thresholdFactor>abc</thresholdFactor></swath></pipelineConfig>";
        assert!(matches!(PipelineConfig::from_xml_str(malformed), Err(IuvsError::XmlParsing(_))));
    }
}
