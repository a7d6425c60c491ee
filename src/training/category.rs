//! Air-quality categories derived from PM2.5 concentration (µg/m³)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bounds (inclusive) of the first three categories
pub const CATEGORY_BREAKPOINTS: [f64; 3] = [12.0, 35.4, 55.4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AirQualityCategory {
    Buena,
    Moderada,
    Mala,
    MuyMala,
}

impl AirQualityCategory {
    pub const ALL: [AirQualityCategory; 4] = [
        AirQualityCategory::Buena,
        AirQualityCategory::Moderada,
        AirQualityCategory::Mala,
        AirQualityCategory::MuyMala,
    ];

    pub fn from_concentration(concentration: f64) -> Self {
        if concentration <= CATEGORY_BREAKPOINTS[0] {
            AirQualityCategory::Buena
        } else if concentration <= CATEGORY_BREAKPOINTS[1] {
            AirQualityCategory::Moderada
        } else if concentration <= CATEGORY_BREAKPOINTS[2] {
            AirQualityCategory::Mala
        } else {
            AirQualityCategory::MuyMala
        }
    }

    /// Numeric class used as the training label
    pub fn code(&self) -> u8 {
        match self {
            AirQualityCategory::Buena => 0,
            AirQualityCategory::Moderada => 1,
            AirQualityCategory::Mala => 2,
            AirQualityCategory::MuyMala => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.get(usize::try_from(code).ok()?).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            AirQualityCategory::Buena => "Buena",
            AirQualityCategory::Moderada => "Moderada",
            AirQualityCategory::Mala => "Mala",
            AirQualityCategory::MuyMala => "Muy Mala",
        }
    }
}

impl fmt::Display for AirQualityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
