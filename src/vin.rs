// 🔑 VIN Decoder - Structural decomposition of 17-character VINs
// Positions (1-indexed): 1-3 manufacturer, 4-8 model code, 9 check digit,
// 10 model year, 11 plant, 12-17 serial

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const VIN_LENGTH: usize = 17;

/// Position of the model-year character (1-indexed)
const YEAR_CODE_POSITION: usize = 10;

// ============================================================================
// VIN ERRORS
// ============================================================================

/// Why a VIN could not be decomposed.
///
/// The `Display` text doubles as the classification reason string, so it is
/// what ends up in the stored audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum VinError {
    #[error("Invalid VIN length ({0} characters, expected 17)")]
    InvalidLength(usize),

    #[error("Invalid VIN characters (VINs are plain ASCII)")]
    InvalidCharacters,

    #[error("Not a target VIN (manufacturer prefix '{found}', expected '{expected}')")]
    UnknownManufacturer { expected: String, found: String },

    #[error("Unrecognized model year code '{0}'")]
    UnknownYearCode(char),

    #[error("Year {year} is outside target range ({min}-{max})")]
    OutOfRange { year: i32, min: i32, max: i32 },
}

// ============================================================================
// YEAR TABLE
// ============================================================================

/// Fixed position-10 code → model year table.
///
/// Built once at start-up and shared read-only by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct YearTable {
    codes: HashMap<char, i32>,
}

impl YearTable {
    /// Codes for the 1984-2002 window (I, O, Q, U and Z are never used)
    pub fn standard() -> Self {
        let codes = [
            ('E', 1984), ('F', 1985), ('G', 1986), ('H', 1987), ('J', 1988), ('K', 1989),
            ('L', 1990), ('M', 1991), ('N', 1992), ('P', 1993), ('R', 1994), ('S', 1995),
            ('T', 1996), ('V', 1997), ('W', 1998), ('X', 1999), ('Y', 2000),
            ('1', 2001), ('2', 2002),
        ];

        YearTable {
            codes: codes.into_iter().collect(),
        }
    }

    pub fn year_for(&self, code: char) -> Option<i32> {
        self.codes.get(&code).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for YearTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// VIN COMPONENTS
// ============================================================================

/// Read-only decomposition of a VIN. Always derivable, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VinComponents {
    pub manufacturer_id: String,
    pub model_code: String,
    pub check_digit: char,
    pub year_code: char,
    pub year: i32,
    pub plant_code: char,
    pub serial: String,
    pub is_first_generation: bool,
}

// ============================================================================
// VIN DECODER
// ============================================================================

#[derive(Debug, Clone)]
pub struct VinDecoder {
    /// Expected 3-character manufacturer/vehicle-line marker
    pub manufacturer_prefix: String,

    /// Oldest accepted model year (default: 1984)
    pub min_year: i32,

    /// Newest accepted model year (default: 2002)
    pub max_year: i32,

    /// Last first-generation model year (default: 1989)
    pub first_gen_max_year: i32,

    years: YearTable,
}

impl VinDecoder {
    pub fn new() -> Self {
        VinDecoder {
            manufacturer_prefix: "JT3".to_string(),
            min_year: 1984,
            max_year: 2002,
            first_gen_max_year: 1989,
            years: YearTable::standard(),
        }
    }

    pub fn with_window(
        manufacturer_prefix: &str,
        min_year: i32,
        max_year: i32,
        first_gen_max_year: i32,
    ) -> Self {
        VinDecoder {
            manufacturer_prefix: manufacturer_prefix.to_string(),
            min_year,
            max_year,
            first_gen_max_year,
            years: YearTable::standard(),
        }
    }

    pub fn year_table(&self) -> &YearTable {
        &self.years
    }

    /// Decode the model year from position 10.
    ///
    /// Accepts any string; anything shorter than 10 characters or carrying an
    /// unknown code yields `None`.
    pub fn decode_year(&self, vin: &str) -> Option<i32> {
        vin.chars()
            .nth(YEAR_CODE_POSITION - 1)
            .and_then(|code| self.years.year_for(code))
    }

    /// Split a VIN into its components, enforcing length, prefix and year window
    pub fn extract_components(&self, vin: &str) -> Result<VinComponents, VinError> {
        let length = vin.chars().count();
        if length != VIN_LENGTH {
            return Err(VinError::InvalidLength(length));
        }

        // Byte slicing below relies on one byte per character
        if !vin.is_ascii() {
            return Err(VinError::InvalidCharacters);
        }

        let manufacturer_id = &vin[0..3];
        if manufacturer_id != self.manufacturer_prefix {
            return Err(VinError::UnknownManufacturer {
                expected: self.manufacturer_prefix.clone(),
                found: manufacturer_id.to_string(),
            });
        }

        let chars: Vec<char> = vin.chars().collect();
        let year_code = chars[YEAR_CODE_POSITION - 1];
        let year = self
            .years
            .year_for(year_code)
            .ok_or(VinError::UnknownYearCode(year_code))?;

        if year < self.min_year || year > self.max_year {
            return Err(VinError::OutOfRange {
                year,
                min: self.min_year,
                max: self.max_year,
            });
        }

        Ok(VinComponents {
            manufacturer_id: manufacturer_id.to_string(),
            model_code: vin[3..8].to_string(),
            check_digit: chars[8],
            year_code,
            year,
            plant_code: chars[10],
            serial: vin[11..17].to_string(),
            is_first_generation: year <= self.first_gen_max_year,
        })
    }
}

impl Default for VinDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
