//! Vocabulary offered for the JCAMP header fields of an output table.

use indexmap::IndexMap;
use once_cell::sync::Lazy;

pub const DATA_TYPES: &[&str] = &[
    "INFRARED SPECTRUM",
    "RAMAN SPECTRUM",
    "INFRARED PEAK TABLE",
    "INFRARED INTERFEROGRAM",
    "INFRARED TRANSFERED SPECTRUM",
    "NMR FID",
    "NMR SPECTRUM",
    "NMR PEAK TABLE",
    "NMP PEAK ASSIGNMENTS",
    "MASS SPECTRUM",
    "CONTINUOUS MASS SPECTRUM",
    "THERMOGRAVIMETRIC ANALYSIS",
    "TENSIOMETRY",
    "UV-VIS",
    "HPLC UV-VIS",
    "GEL PERMEATION CHROMATOGRAPHY",
    "CIRCULAR DICHROISM SPECTROSCOPY",
    "CYCLIC VOLTAMMETRY",
    "X-RAY DIFFRACTION",
    "AIF",
    "SINGLE CRYSTAL X-RAY DIFFRACTION",
    "SORPTION-DESORPTION MEASUREMENT",
    "SIZE EXCLUSION CHROMATOGRAPHY",
];

pub const DATA_CLASSES: &[&str] = &["XYPOINTS", "XYDATA", "PEAK TABLE", "NTUPLES"];

pub const XUNITS: &[&str] = &[
    "p/p0",
    "kPa",
    "%",
    "1/CM",
    "2Theta",
    "DEGREES CELSIUS",
    "G/MOL",
    "HZ",
    "KILOGRAM",
    "MICROMETERS",
    "MILIMETERS",
    "MILLILITERS",
    "MINUTES",
    "m/z",
    "MOLECULAR MASS / DA",
    "NANOMETERS",
    "SECONDS",
    "Voltage vs Ref",
    "wavelength (nm)",
];

pub const YUNITS: &[&str] = &[
    "ml/g",
    "mmol/g",
    "ABSORBANCE",
    "Ampere",
    "ARBITRARY UNITS",
    "COUNTS",
    "DERIVATIVE WEIGHT",
    "Intensity",
    "KUBELKA-MUNK",
    "mAU",
    "N/M2",
    "Newton",
    "REFLECTANCE",
    "SIGNAL",
    "TRANSMITTANCE",
    "WEIGHT",
    "ellipticity (deg cm2/dmol)",
    "Molar Extinction (cm2/mmol)",
];

static OPTIONS: Lazy<IndexMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    IndexMap::from([
        ("DATA TYPE", DATA_TYPES),
        ("DATA CLASS", DATA_CLASSES),
        ("XUNITS", XUNITS),
        ("YUNITS", YUNITS),
    ])
});

/// Header field -> allowed values, in display order.
pub fn options() -> &'static IndexMap<&'static str, &'static [&'static str]> {
    &OPTIONS
}
