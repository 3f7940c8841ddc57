//! Input readers: ancillary tables and data product filenames

pub mod ancillary;
pub mod filename;

pub use ancillary::{
    parse_table, read_flatfield, read_gain_table, read_point_spread_function, read_sensitivity_curve,
    read_solar_spectrum, read_table, read_template, read_template_library, read_wavelength_grid,
};
pub use filename::DataFilename;
