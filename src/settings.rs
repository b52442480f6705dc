// Runtime settings
//
// Layered with the `config` crate: built-in defaults, then an optional TOML
// file, then `WIPECERT_*` environment variables (`__` separates nested keys).

use crate::{
    builtin_profiles, Compliance, OverwriteScheme, SanitizationProfile, WipeError, WipeResult,
};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "WIPECERT";

/// Overrides for one profile; unset fields keep the built-in value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileSettings {
    pub method: Option<String>,
    pub pass_count: Option<u32>,
    pub verification_required: Option<bool>,
    pub scheme: Option<OverwriteScheme>,
    pub standard: Option<String>,
    pub level: Option<String>,
}

impl ProfileSettings {
    fn apply(&self, base: SanitizationProfile) -> SanitizationProfile {
        SanitizationProfile {
            method: self.method.clone().unwrap_or(base.method),
            pass_count: self.pass_count.unwrap_or(base.pass_count),
            verification_required: self
                .verification_required
                .unwrap_or(base.verification_required),
            scheme: self.scheme.unwrap_or(base.scheme),
            compliance: Compliance {
                standard: self.standard.clone().unwrap_or(base.compliance.standard),
                level: self.level.clone().unwrap_or(base.compliance.level),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub certificate_dir: PathBuf,
    pub log_dir: PathBuf,
    pub default_profile: String,
    pub progress_width: usize,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileSettings>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "wipecert", "wipecert")
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./wipecert-data"))
}

/// `config.toml` in the platform config directory
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Settings {
    /// Load settings. An explicit `config_file` must exist; the default one
    /// is optional.
    pub fn load(config_file: Option<&Path>) -> WipeResult<Self> {
        let data_dir = default_data_dir();
        let mut builder = Config::builder()
            .set_default(
                "certificate_dir",
                data_dir.join("certificates").to_string_lossy().to_string(),
            )?
            .set_default("log_dir", data_dir.join("logs").to_string_lossy().to_string())?
            .set_default("default_profile", "nist-clear")?
            .set_default("progress_width", 40i64)?;

        match config_file {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_file() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> WipeResult<()> {
        if self.progress_width == 0 {
            return Err(WipeError::Config("progress_width must be positive".to_string()));
        }
        for (_, profile) in self.profiles() {
            profile.validate()?;
        }
        self.profile(&self.default_profile).map(|_| ())
    }

    /// Built-in catalog with configured overrides applied, plus any extra
    /// profiles defined only in settings.
    pub fn profiles(&self) -> Vec<(String, SanitizationProfile)> {
        let mut catalog: Vec<(String, SanitizationProfile)> = builtin_profiles()
            .into_iter()
            .map(|(name, profile)| {
                let profile = match self.profiles.get(name) {
                    Some(overrides) => overrides.apply(profile),
                    None => profile,
                };
                (name.to_string(), profile)
            })
            .collect();

        for (name, overrides) in &self.profiles {
            if catalog.iter().any(|(known, _)| known == name) {
                continue;
            }
            let base = SanitizationProfile {
                method: name.clone(),
                ..SanitizationProfile::nist_clear()
            };
            catalog.push((name.clone(), overrides.apply(base)));
        }

        catalog
    }

    pub fn profile(&self, name: &str) -> WipeResult<SanitizationProfile> {
        self.profiles()
            .into_iter()
            .find(|(known, _)| known == name)
            .map(|(_, profile)| profile)
            .ok_or_else(|| WipeError::InvalidProfile(format!("unknown profile '{}'", name)))
    }
}
