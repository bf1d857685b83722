//! Runtime configuration: the theater list, the premium format set and
//! the knobs for navigation, caching and the mirror.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::TheaterConfig;
use crate::browser::NavigationPolicy;
use crate::error::ConfigError;

pub const SITE_ORIGIN: &str = "https://www.movietickets.com";

const DEFAULT_THEATERS: [(&str, &str); 9] = [
    (
        "AMC Lincoln Square 13",
        "https://www.movietickets.com/theater/amc-lincoln-square-13/dQ9fepfmriLGtzO",
    ),
    (
        "Regal Union Square ScreenX and 4DX",
        "https://www.movietickets.com/theater/regal-union-square-screenx-and-4dx/Lrbfx2flzcP4SYq",
    ),
    (
        "Regal Times Square",
        "https://www.movietickets.com/theater/regal-times-square/1K4fe6fx8fpnhxp",
    ),
    (
        "Angelika Film Center and Cafe",
        "https://www.movietickets.com/theater/angelika-film-center-and-cafe/Al2f6XiGOIkVTp4",
    ),
    (
        "Village East by Angelika",
        "https://www.movietickets.com/theater/village-east-by-angelika/JB2fqyfvMI4ohVr",
    ),
    (
        "Cinema 123 by Angelika",
        "https://www.movietickets.com/theater/cinema-123-by-angelika/bJ9faWflvIMBTBv",
    ),
    (
        "AMC Empire 25",
        "https://www.movietickets.com/theater/amc-empire-25/r89fOVfArhGZSdq",
    ),
    (
        "AMC Village 7",
        "https://www.movietickets.com/theater/amc-village-7/WYXf89SDyiGAs9P",
    ),
    (
        "Regal Battery Park",
        "https://www.movietickets.com/theater/regal-battery-park/PDkfL2fMpFWQfkV",
    ),
];

const DEFAULT_PREMIUM_FORMATS: [&str; 12] = [
    "IMAX",
    "IMAX 70MM",
    "IMAX with Laser",
    "IMAX with Laser 3D",
    "RPX",
    "4DX",
    "ScreenX",
    "RealD 3D",
    "Dolby Cinema @ AMC",
    "Laser at AMC",
    "Digital 3D",
    "70MM Film",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theaters: Vec<TheaterConfig>,
    pub premium_formats: Vec<String>,
    /// Number of days scraped per theater, starting today.
    pub day_window: u32,
    /// Prefix for the relative booking links found on listing pages.
    pub site_origin: String,
    pub cache_path: PathBuf,
    /// When set, `/refresh` copies this pre-built snapshot instead of scraping.
    pub mirror_url: Option<String>,
    pub navigation_attempts: u32,
    pub navigation_backoff_ms: u64,
    pub settle_ms: u64,
    pub ready_timeout_secs: u64,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theaters: DEFAULT_THEATERS
                .iter()
                .map(|(name, url)| TheaterConfig::new(*name, *url))
                .collect(),
            premium_formats: DEFAULT_PREMIUM_FORMATS.iter().map(|s| s.to_string()).collect(),
            day_window: 4,
            site_origin: SITE_ORIGIN.to_string(),
            cache_path: PathBuf::from("cinema_cache.json"),
            mirror_url: None,
            navigation_attempts: 2,
            navigation_backoff_ms: 2000,
            settle_ms: 1500,
            ready_timeout_secs: 10,
            chrome_executable: None,
        }
    }
}

impl Config {
    /// Read a JSON config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.navigation_attempts == 0 {
            return Err(ConfigError::Invalid(
                "navigation_attempts must be at least 1".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for theater in &self.theaters {
            if !seen.insert(theater.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate theater name: {}",
                    theater.name
                )));
            }
        }
        Ok(())
    }

    pub fn navigation_policy(&self) -> NavigationPolicy {
        NavigationPolicy {
            attempts: self.navigation_attempts,
            backoff: Duration::from_millis(self.navigation_backoff_ms),
            settle: Duration::from_millis(self.settle_ms),
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_the_configured_theaters() {
        let config = Config::default();
        assert_eq!(config.theaters.len(), 9);
        assert_eq!(config.theaters[0].name, "AMC Lincoln Square 13");
        assert_eq!(config.day_window, 4);
        assert!(config.premium_formats.iter().any(|f| f == "70MM Film"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"theaters":[{{"name":"Test","url":"http://localhost/t"}}],"day_window":2}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.theaters, vec![TheaterConfig::new("Test", "http://localhost/t")]);
        assert_eq!(config.day_window, 2);
        assert_eq!(config.site_origin, SITE_ORIGIN);
        assert_eq!(config.navigation_attempts, 2);
    }

    #[test]
    fn duplicate_theater_names_are_rejected() {
        let mut config = Config::default();
        config.theaters.push(config.theaters[0].clone());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config = Config {
            navigation_attempts: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::from_file(Path::new("/nonexistent/showtimes.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
