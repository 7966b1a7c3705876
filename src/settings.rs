use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub endpoint: String,
    pub api_key: String,
    pub vision_deployment: String,
    pub audio_deployment: String,
    pub api_version: String,
    pub use_bearer: bool,
    /// JPEG quality for frames sent to the oracle (1–100).
    pub jpeg_quality: u8,
    /// Camera settle time before a verification capture.
    pub verify_settle_ms: u64,
    pub request_timeout_secs: u64,
    pub max_output_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            vision_deployment: "gpt-4o".into(),
            audio_deployment: "gpt-4o-audio-preview".into(),
            api_version: "2024-10-21".into(),
            use_bearer: false,
            jpeg_quality: 80,
            verify_settle_ms: 1500,
            request_timeout_secs: 30,
            max_output_tokens: 1500,
        }
    }
}

/// `<config dir>/fixlens/settings.toml`
pub fn config_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir()
        .ok_or_else(|| "no config directory on this platform".to_string())?
        .join("fixlens");
    Ok(dir.join("settings.toml"))
}

impl Settings {
    /// Load settings from the default location, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load() -> Result<Self, String> {
        let mut settings = Self::load_from(&config_path()?)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        toml::from_str(&content).map_err(|e| e.to_string())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| e.to_string())?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, content).map_err(|e| e.to_string())?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Overlay values from `AZURE_OPENAI_*` variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("AZURE_OPENAI_ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = non_empty("AZURE_OPENAI_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = non_empty("AZURE_OPENAI_VISION_DEPLOYMENT") {
            self.vision_deployment = v;
        }
        if let Some(v) = non_empty("AZURE_OPENAI_AUDIO_DEPLOYMENT") {
            self.audio_deployment = v;
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(s, Settings::default());
        assert!(!s.is_configured());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let s = Settings {
            endpoint: "https://fix.openai.azure.com".into(),
            api_key: "k".into(),
            verify_settle_ms: 250,
            ..Settings::default()
        };
        s.save_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("verifySettleMs = 250"));
        assert_eq!(Settings::load_from(&path).unwrap(), s);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "endpoint = \"https://x\"\njpegQuality = 60\n").unwrap();
        let s = Settings::load_from(&path).unwrap();
        assert_eq!(s.endpoint, "https://x");
        assert_eq!(s.jpeg_quality, 60);
        assert_eq!(s.verify_settle_ms, 1500);
    }

    #[test]
    fn env_overrides_skip_blank_values() {
        let env: HashMap<&str, &str> = [
            ("AZURE_OPENAI_ENDPOINT", "https://env.openai.azure.com"),
            ("AZURE_OPENAI_API_KEY", "  "),
        ]
        .into_iter()
        .collect();
        let mut s = Settings {
            api_key: "from-file".into(),
            ..Settings::default()
        };
        s.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.endpoint, "https://env.openai.azure.com");
        assert_eq!(s.api_key, "from-file");
    }
}
