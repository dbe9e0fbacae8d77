//! HAMP radiometer band catalogue

use crate::types::{HampError, HampResult, RadiometerModule};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Named frequency band as used in quality annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "K")]
    K,
    #[serde(rename = "V")]
    V,
    #[serde(rename = "90")]
    W90,
    #[serde(rename = "119")]
    F119,
    #[serde(rename = "183")]
    G183,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::K, Band::V, Band::W90, Band::F119, Band::G183];

    /// Inclusive channel frequency range in GHz
    pub fn frequency_range(&self) -> (f64, f64) {
        match self {
            Band::K => (22.0, 32.0),
            Band::V => (50.0, 58.0),
            Band::W90 => (90.0, 90.0),
            Band::F119 => (120.0, 128.0),
            Band::G183 => (183.0, 191.0),
        }
    }

    /// Module whose raw file carries this band
    pub fn module(&self) -> RadiometerModule {
        match self {
            Band::K | Band::V => RadiometerModule::KV,
            Band::W90 | Band::F119 => RadiometerModule::WF11990,
            Band::G183 => RadiometerModule::G183,
        }
    }

    pub fn contains(&self, frequency_ghz: f64) -> bool {
        let (low, high) = self.frequency_range();
        // channel centres are given to two decimals
        frequency_ghz >= low - 0.005 && frequency_ghz <= high + 0.005
    }

    /// Boolean selector over a frequency axis
    pub fn channel_mask(&self, frequency: ArrayView1<f64>) -> Vec<bool> {
        frequency.iter().map(|&f| self.contains(f)).collect()
    }

    pub fn for_module(module: RadiometerModule) -> Vec<Band> {
        Band::ALL.iter().copied().filter(|b| b.module() == module).collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Band::K => "K",
            Band::V => "V",
            Band::W90 => "90",
            Band::F119 => "119",
            Band::G183 => "183",
        }
    }
}

impl std::str::FromStr for Band {
    type Err = HampError;

    fn from_str(s: &str) -> HampResult<Self> {
        match s.trim() {
            "K" | "k" => Ok(Band::K),
            "V" | "v" => Ok(Band::V),
            "90" => Ok(Band::W90),
            "119" => Ok(Band::F119),
            "183" => Ok(Band::G183),
            other => Err(HampError::Configuration(format!("unknown radiometer band '{}'", other))),
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kv_channels_split_into_bands() {
        let freq = array![22.24, 23.04, 31.4, 50.3, 58.0];
        assert_eq!(Band::K.channel_mask(freq.view()), vec![true, true, true, false, false]);
        assert_eq!(Band::V.channel_mask(freq.view()), vec![false, false, false, true, true]);
    }

    #[test]
    fn test_band_lookup() {
        assert_eq!("119".parse::<Band>().unwrap(), Band::F119);
        assert_eq!(Band::F119.module(), RadiometerModule::WF11990);
        assert!("W".parse::<Band>().is_err());
        assert_eq!(Band::for_module(RadiometerModule::KV), vec![Band::K, Band::V]);
    }
}
