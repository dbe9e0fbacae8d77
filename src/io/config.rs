//! Per-flight configuration loaded from YAML

use crate::core::pipeline::ProcessingConfig;
use crate::types::{HampError, HampResult, RadiometerModule};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Navigation system the flight was recorded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationSource {
    /// HALO's BAHAMAS data acquisition system
    Bahamas,
    /// PLANET satellite tracker, used when BAHAMAS data are unavailable
    Planet,
}

impl std::fmt::Display for NavigationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationSource::Bahamas => write!(f, "BAHAMAS"),
            NavigationSource::Planet => write!(f, "PLANET"),
        }
    }
}

/// Path templates; `{date}`, `{yymmdd}`, `{flightletter}` and `{flight}`
/// are substituted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathTemplates {
    pub bahamas: String,
    pub radiometer: String,
    pub radar: String,
    #[serde(default)]
    pub saveplts: Option<String>,
    #[serde(default)]
    pub writedata: Option<String>,
    #[serde(default)]
    pub error_file: Option<String>,
}

/// Paths with every placeholder resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPaths {
    pub navigation: PathBuf,
    pub radiometer: PathBuf,
    pub radar: PathBuf,
    pub saveplts: Option<PathBuf>,
    pub writedata: Option<PathBuf>,
    pub error_file: Option<PathBuf>,
    radiometer_date: String,
}

impl ResolvedPaths {
    /// `<radiometer>/<module>/<YYMMDD>.BRT.NC`
    pub fn radiometer_file(&self, module: RadiometerModule) -> PathBuf {
        self.radiometer
            .join(module.directory())
            .join(format!("{}.BRT.NC", self.radiometer_date))
    }

    /// `<radiometer>/KV/<YYMMDD>.IWV.NC`
    pub fn iwv_file(&self) -> PathBuf {
        self.radiometer
            .join(RadiometerModule::KV.directory())
            .join(format!("{}.IWV.NC", self.radiometer_date))
    }
}

/// Flight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightConfig {
    #[serde(deserialize_with = "text_or_number")]
    pub flight: String,
    /// YYYYMMDD
    #[serde(deserialize_with = "text_or_number")]
    pub date: String,
    pub flightletter: String,
    pub is_planet: bool,
    pub paths: PathTemplates,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Number(u64),
    }
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(text) => text,
        Scalar::Number(number) => number.to_string(),
    })
}

impl FlightConfig {
    pub fn from_yaml_str(text: &str) -> HampResult<Self> {
        let config: FlightConfig = serde_yaml::from_str(text).map_err(|e| {
            HampError::Configuration(format!("invalid flight configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> HampResult<Self> {
        let path = path.as_ref();
        log::info!("Reading config YAML: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            HampError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> HampResult<()> {
        self.flight_date()?;
        if self.flightletter.trim().is_empty() {
            return Err(HampError::Configuration("flightletter is empty".to_string()));
        }
        self.paths()?;
        Ok(())
    }

    pub fn flight_date(&self) -> HampResult<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y%m%d").map_err(|e| {
            HampError::Configuration(format!("date '{}' is not YYYYMMDD: {}", self.date, e))
        })
    }

    /// Date as used by the radiometer archive (YYMMDD)
    pub fn radiometer_date(&self) -> &str {
        self.date.get(2..).unwrap_or(&self.date)
    }

    /// e.g. `HALO-20240811a`
    pub fn flightname(&self) -> String {
        format!("HALO-{}{}", self.date, self.flightletter)
    }

    pub fn navigation_source(&self) -> NavigationSource {
        if self.is_planet {
            NavigationSource::Planet
        } else {
            NavigationSource::Bahamas
        }
    }

    pub fn paths(&self) -> HampResult<ResolvedPaths> {
        let optional = |template: &Option<String>| -> HampResult<Option<PathBuf>> {
            template.as_deref().map(|t| self.render(t).map(PathBuf::from)).transpose()
        };
        Ok(ResolvedPaths {
            navigation: PathBuf::from(self.render(&self.paths.bahamas)?),
            radiometer: PathBuf::from(self.render(&self.paths.radiometer)?),
            radar: PathBuf::from(self.render(&self.paths.radar)?),
            saveplts: optional(&self.paths.saveplts)?,
            writedata: optional(&self.paths.writedata)?,
            error_file: optional(&self.paths.error_file)?,
            radiometer_date: self.radiometer_date().to_string(),
        })
    }

    /// Substitute placeholders in `template`
    pub fn render(&self, template: &str) -> HampResult<String> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            output.push_str(&rest[..open]);
            let close = rest[open..].find('}').ok_or_else(|| {
                HampError::Configuration(format!("unterminated placeholder in '{}'", template))
            })?;
            let key = &rest[open + 1..open + close];
            let value = match key {
                "date" => self.date.as_str(),
                "yymmdd" => self.radiometer_date(),
                "flightletter" => self.flightletter.as_str(),
                "flight" => self.flight.as_str(),
                other => {
                    return Err(HampError::Configuration(format!(
                        "unknown placeholder '{{{}}}' in '{}'",
                        other, template
                    )))
                }
            };
            output.push_str(value);
            rest = &rest[open + close + 1..];
        }
        output.push_str(rest);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
flight: RF03
date: "20240811"
flightletter: a
is_planet: false
paths:
  bahamas: /data/HALO-{date}{flightletter}/bahamas/QL_HALO-{date}{flightletter}_BAHAMAS_V01.nc
  radiometer: /data/HALO-{date}{flightletter}/radiometer
  radar: /data/HALO-{date}{flightletter}/radar/*{yymmdd}*.nc
  writedata: /out/{flight}
"#;

    #[test]
    fn test_paths_are_rendered() {
        let config = FlightConfig::from_yaml_str(CONFIG).unwrap();
        let paths = config.paths().unwrap();
        assert_eq!(config.flightname(), "HALO-20240811a");
        assert_eq!(config.radiometer_date(), "240811");
        assert_eq!(
            paths.radiometer_file(RadiometerModule::G183),
            PathBuf::from("/data/HALO-20240811a/radiometer/183/240811.BRT.NC")
        );
        assert_eq!(paths.writedata, Some(PathBuf::from("/out/RF03")));
        assert_eq!(paths.saveplts, None);
        assert_eq!(config.navigation_source(), NavigationSource::Bahamas);
    }

    #[test]
    fn test_unknown_placeholder_is_rejected() {
        let text = CONFIG.replace("{flight}", "{campaign}");
        assert!(matches!(
            FlightConfig::from_yaml_str(&text),
            Err(HampError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let text = CONFIG.replace("is_planet: false\n", "");
        assert!(matches!(
            FlightConfig::from_yaml_str(&text),
            Err(HampError::Configuration(_))
        ));
    }

    #[test]
    fn test_numeric_date_is_accepted() {
        let text = CONFIG.replace("\"20240811\"", "20240811");
        let config = FlightConfig::from_yaml_str(&text).unwrap();
        assert_eq!(config.date, "20240811");
    }
}
