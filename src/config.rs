//! Runtime configuration, read from the environment (and `.env`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CarouselError, Result};
use crate::image_handler::DEFAULT_LOAD_TIMEOUT;

pub const DB_PATH_VAR: &str = "CAROUSEL_DB_PATH";
pub const FONT_PATH_VAR: &str = "CAROUSEL_FONT_PATH";
pub const OUTPUT_DIR_VAR: &str = "CAROUSEL_OUTPUT_DIR";
pub const LOAD_TIMEOUT_VAR: &str = "CAROUSEL_LOAD_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    /// Caption font; only needed when compositing.
    pub font_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub load_timeout: Duration,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or empty keys
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let load_timeout = match get(LOAD_TIMEOUT_VAR) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    CarouselError::Config(format!("{} must be a whole number, got {:?}", LOAD_TIMEOUT_VAR, raw))
                })?;
                if secs == 0 {
                    return Err(CarouselError::Config(format!(
                        "{} must be greater than zero",
                        LOAD_TIMEOUT_VAR
                    )));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_LOAD_TIMEOUT,
        };

        Ok(Config {
            db_path: get(DB_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(Self::default_db_path),
            font_path: get(FONT_PATH_VAR).map(PathBuf::from),
            output_dir: get(OUTPUT_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            load_timeout,
        })
    }

    /// Where the mockup database lives when nothing is configured:
    /// - Linux: ~/.local/share/carousel-engine/mockups.db
    /// - macOS: ~/Library/Application Support/carousel-engine/mockups.db
    /// - Windows: %APPDATA%\carousel-engine\mockups.db
    pub fn default_db_path() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("carousel-engine")
            .join("mockups.db")
    }

    pub fn require_font(&self) -> Result<&Path> {
        self.font_path.as_deref().ok_or_else(|| {
            CarouselError::Config(format!("no caption font configured; set {}", FONT_PATH_VAR))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.db_path, Config::default_db_path());
        assert_eq!(config.font_path, None);
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.load_timeout, Duration::from_secs(15));
        assert!(matches!(
            config.require_font(),
            Err(CarouselError::Config(_))
        ));
    }

    #[test]
    fn test_reads_all_keys() {
        let config = Config::from_lookup(lookup(&[
            (DB_PATH_VAR, "/tmp/m.db"),
            (FONT_PATH_VAR, "/fonts/PlayfairDisplay-SemiBold.ttf"),
            (OUTPUT_DIR_VAR, "out"),
            (LOAD_TIMEOUT_VAR, " 30 "),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/m.db"));
        assert_eq!(
            config.require_font().unwrap(),
            Path::new("/fonts/PlayfairDisplay-SemiBold.ttf")
        );
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.load_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_values_fall_back() {
        let config = Config::from_lookup(lookup(&[(OUTPUT_DIR_VAR, "  "), (FONT_PATH_VAR, "")])).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.font_path, None);
    }

    #[test]
    fn test_rejects_bad_timeout() {
        for raw in ["0", "soon", "-5"] {
            let err = Config::from_lookup(lookup(&[(LOAD_TIMEOUT_VAR, raw)])).unwrap_err();
            assert!(matches!(err, CarouselError::Config(_)), "{}", raw);
        }
    }
}
