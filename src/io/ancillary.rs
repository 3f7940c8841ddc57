//! Readers for the plain-text ancillary tables used by the pipeline:
//! sensitivity curves, solar spectra, point-spread functions, emission
//! templates, flatfields and gain tables.
//!
//! All tables are whitespace or comma separated numbers, one row per line.
//! Everything after a `#` is a comment and blank lines are ignored.

use crate::core::flatfield::Flatfield;
use crate::core::gain::NonlinearGainTable;
use crate::core::templates::TemplateLibrary;
use crate::types::{IuvsError, IuvsResult, PointSpreadFunction, SensitivityCurve, SolarReferenceSpectrum};
use ndarray::{Array1, Array2};
use std::fs;
use std::path::Path;

/// Extension of template files inside a template directory
pub const TEMPLATE_EXTENSION: &str = "dat";

/// Parse a numeric table, skipping the first `skip_header` data lines
pub fn parse_table(content: &str, skip_header: usize) -> IuvsResult<Array2<f64>> {
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (line_number, line) in content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.split('#').next().unwrap_or("").trim()))
        .filter(|(_, l)| !l.is_empty())
        .skip(skip_header)
    {
        let row = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
            .map(|token| {
                token.parse::<f64>().map_err(|e| {
                    IuvsError::InvalidFormat(format!("Line {}: cannot parse '{}': {}", line_number, token, e))
                })
            })
            .collect::<IuvsResult<Vec<f64>>>()?;

        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(IuvsError::InvalidFormat(format!(
                    "Line {} has {} columns, expected {}",
                    line_number,
                    row.len(),
                    first.len()
                )));
            }
        }
        rows.push(row);
    }

    let n_rows = rows.len();
    let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if n_rows == 0 || n_cols == 0 {
        return Err(IuvsError::InvalidFormat("Table contains no data".to_string()));
    }

    Array2::from_shape_vec((n_rows, n_cols), rows.into_iter().flatten().collect())
        .map_err(|e| IuvsError::InvalidFormat(format!("Table shape error: {}", e)))
}

/// Read a numeric table from `path`
pub fn read_table<P: AsRef<Path>>(path: P, skip_header: usize) -> IuvsResult<Array2<f64>> {
    let path = path.as_ref();
    log::debug!("Reading table {}", path.display());
    let content = fs::read_to_string(path)?;
    parse_table(&content, skip_header).map_err(|e| match e {
        IuvsError::InvalidFormat(msg) => IuvsError::InvalidFormat(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Every value of a table in row-major order
fn read_flat<P: AsRef<Path>>(path: P) -> IuvsResult<Array1<f64>> {
    let table = read_table(path, 0)?;
    Ok(table.iter().copied().collect())
}

/// Two-column (wavelength [nm], responsivity) sensitivity curve
pub fn read_sensitivity_curve<P: AsRef<Path>>(path: P) -> IuvsResult<SensitivityCurve> {
    let table = read_table(&path, 0)?;
    let curve = SensitivityCurve::from_table(&table)?;
    log::info!(
        "Loaded sensitivity curve with {} samples from {}",
        curve.wavelengths().len(),
        path.as_ref().display()
    );
    Ok(curve)
}

/// Two-column (wavelength [nm], irradiance [W/m²/nm]) solar spectrum at 1 AU
pub fn read_solar_spectrum<P: AsRef<Path>>(path: P) -> IuvsResult<SolarReferenceSpectrum> {
    let table = read_table(&path, 0)?;
    let spectrum = SolarReferenceSpectrum::from_table(&table)?;
    log::info!(
        "Loaded solar spectrum with {} samples from {}",
        spectrum.wavelengths().len(),
        path.as_ref().display()
    );
    Ok(spectrum)
}

/// Point-spread function weights, normalised on load
pub fn read_point_spread_function<P: AsRef<Path>>(path: P) -> IuvsResult<PointSpreadFunction> {
    PointSpreadFunction::new(read_flat(path)?.to_vec())
}

/// A single template spectrum. Multi-column files contribute their last
/// column.
pub fn read_template<P: AsRef<Path>>(path: P) -> IuvsResult<Array1<f64>> {
    let table = read_table(path, 0)?;
    if table.ncols() == 1 || table.nrows() == 1 {
        Ok(table.iter().copied().collect())
    } else {
        Ok(table.column(table.ncols() - 1).to_owned())
    }
}

/// Templates stored as `<name>.dat` inside `directory`.
///
/// With `names` the library contains exactly those templates in that order;
/// otherwise every `.dat` file is loaded in alphabetical order.
pub fn read_template_library<P: AsRef<Path>>(directory: P, names: Option<&[&str]>) -> IuvsResult<TemplateLibrary> {
    let directory = directory.as_ref();
    let names: Vec<String> = match names {
        Some(names) => names.iter().map(|n| n.to_string()).collect(),
        None => {
            let mut found = Vec::new();
            for entry in fs::read_dir(directory)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        found.push(stem.to_string());
                    }
                }
            }
            found.sort();
            found
        }
    };

    let mut library = TemplateLibrary::new();
    for name in &names {
        let path = directory.join(format!("{}.{}", name, TEMPLATE_EXTENSION));
        library.insert(name.clone(), read_template(&path)?)?;
    }

    log::info!(
        "Loaded {} templates from {}",
        library.len(),
        directory.display()
    );
    Ok(library)
}

/// Flatfield values (positions x spectral bins) and the wavelengths of its
/// columns
pub fn read_flatfield<P: AsRef<Path>, Q: AsRef<Path>>(values_path: P, wavelengths_path: Q) -> IuvsResult<Flatfield> {
    let values = read_table(values_path, 0)?;
    let wavelengths = read_flat(wavelengths_path)?;
    Flatfield::new(values, wavelengths.to_vec())
}

/// Wavelength [nm] of every detector pixel, or any other one-dimensional grid
pub fn read_wavelength_grid<P: AsRef<Path>>(path: P) -> IuvsResult<Array1<f64>> {
    read_flat(path)
}

/// Three-column (voltage, a, b) non-linear gain table
pub fn read_gain_table<P: AsRef<Path>>(path: P) -> IuvsResult<NonlinearGainTable> {
    NonlinearGainTable::from_table(&read_table(path, 0)?)
}
