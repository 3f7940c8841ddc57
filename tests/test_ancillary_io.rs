use iuvs_l1c::core::templates::{CO2P_UVD, NO_NIGHTGLOW};
use iuvs_l1c::io::{
    read_flatfield, read_gain_table, read_point_spread_function, read_sensitivity_curve, read_solar_spectrum,
    read_template_library, read_wavelength_grid,
};
use iuvs_l1c::{IuvsError, PipelineConfig};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write test file");
    path
}

#[test]
fn test_read_curves() {
    let dir = TempDir::new().unwrap();
    let sensitivity = write(dir.path(), "sensitivity.dat", "# nm  DN/(photon/cm2)\n110 0.5\n150 1.0\n190 0.7\n");
    let solar = write(dir.path(), "solar.dat", "100.0,1e-4\n200.0,2e-3\n300.0,3e-2\n");

    let curve = read_sensitivity_curve(&sensitivity).expect("Failed to read sensitivity curve");
    assert_eq!(curve.wavelengths(), &[110.0, 150.0, 190.0]);
    assert_eq!(curve.domain(), (110.0, 190.0));

    let spectrum = read_solar_spectrum(&solar).expect("Failed to read solar spectrum");
    assert_eq!(spectrum.irradiance().len(), 3);

    let unsorted = write(dir.path(), "unsorted.dat", "150 1.0\n110 0.5\n");
    assert!(matches!(
        read_sensitivity_curve(&unsorted),
        Err(IuvsError::InvalidSensitivityCurve(_))
    ));
    assert!(matches!(
        read_sensitivity_curve(dir.path().join("missing.dat")),
        Err(IuvsError::Io(_))
    ));
}

#[test]
fn test_read_psf_and_grids() {
    let dir = TempDir::new().unwrap();
    let psf = write(dir.path(), "psf.dat", "1\n2\n1\n");
    let psf = read_point_spread_function(&psf).unwrap();
    assert_eq!(psf.weights(), &[0.25, 0.5, 0.25]);

    let grid = write(dir.path(), "wavelengths.dat", "110 111 112\n113 114 115\n");
    let grid = read_wavelength_grid(&grid).unwrap();
    assert_eq!(grid.to_vec(), vec![110.0, 111.0, 112.0, 113.0, 114.0, 115.0]);

    let gain = write(dir.path(), "gain.dat", "500 0.1 1.0\n700 0.2 1.1\n");
    let gain = read_gain_table(&gain).unwrap();
    let (a, b) = gain.coefficients(600.0);
    assert!((a - 0.15).abs() < 1e-12 && (b - 1.05).abs() < 1e-12);
}

#[test]
fn test_read_template_library_directory() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "no_nightglow.dat", "120 0\n121 1\n122 3\n123 1\n");
    write(dir.path(), "co2p_uvd.dat", "0\n0\n2\n5\n");
    write(dir.path(), "notes.txt", "not a template\n");

    let all = read_template_library(dir.path(), None).expect("Failed to read templates");
    assert_eq!(all.names(), vec![CO2P_UVD, NO_NIGHTGLOW]);
    assert_eq!(all.get(NO_NIGHTGLOW).unwrap().to_vec(), vec![0.0, 1.0, 3.0, 1.0]);

    let ordered = read_template_library(dir.path(), Some(&[NO_NIGHTGLOW, CO2P_UVD][..])).unwrap();
    assert_eq!(ordered.names(), vec![NO_NIGHTGLOW, CO2P_UVD]);

    write(dir.path(), "short.dat", "1\n2\n");
    assert!(read_template_library(dir.path(), None).is_err());
}

#[test]
fn test_read_flatfield() {
    let dir = TempDir::new().unwrap();
    let values = write(dir.path(), "ff.dat", "1.0 0.9 1.1\n0.8 1.0 1.2\n");
    let wavelengths = write(dir.path(), "ff_wavelengths.dat", "120 140 160\n");

    let flatfield = read_flatfield(&values, &wavelengths).unwrap();
    assert_eq!(flatfield.n_positions(), 2);
    assert_eq!(flatfield.wavelengths(), &[120.0, 140.0, 160.0]);

    let bad_wavelengths = write(dir.path(), "ff_bad.dat", "120 140\n");
    assert!(matches!(
        read_flatfield(&values, &bad_wavelengths),
        Err(IuvsError::ShapeMismatch(_))
    ));
}

#[test]
fn test_read_pipeline_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "pipeline.xml",
        "<pipelineConfig><solarFlux><maxDepth>12</maxDepth></solarFlux></pipelineConfig>",
    );
    let config = PipelineConfig::from_xml_file(&path).expect("Failed to read configuration");
    assert_eq!(config.solar_flux.max_depth, 12);
    assert_eq!(config.swath.threshold_factor, 2.0);
}
