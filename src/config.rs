use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub retarget: RetargetConfig,
    #[serde(default)]
    pub rig: RigConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// フレームごとに `Retargeter::update` へ渡す設定
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct RetargetConfig {
    /// ボーン回転の追従率 (0, 1]
    #[serde(default = "default_slerp_factor")]
    pub slerp_factor: f32,
    /// 左右反転（セルフィー映像用）
    #[serde(default)]
    pub mirror_x: bool,
    /// 接地させる床の高さ（リグ空間）
    #[serde(default = "default_ground_y")]
    pub ground_y: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RigConfig {
    /// リグ階層JSON
    #[serde(default = "default_rig_path")]
    pub path: String,
    /// バインド前に Hips をルート原点へ寄せる
    #[serde(default = "default_recenter_hips")]
    pub recenter_hips: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    /// JSON Lines のフレーム列
    #[serde(default = "default_frames_path")]
    pub frames_path: String,
    /// 何フレームごとに状態を出すか (0で無効)
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
}

fn default_slerp_factor() -> f32 { 0.35 }
fn default_ground_y() -> f32 { -1.0 }
fn default_rig_path() -> String { "rig.json".to_string() }
fn default_recenter_hips() -> bool { true }
fn default_frames_path() -> String { "frames.jsonl".to_string() }
fn default_log_interval() -> usize { 30 }

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            slerp_factor: default_slerp_factor(),
            mirror_x: false,
            ground_y: default_ground_y(),
        }
    }
}

impl RetargetConfig {
    /// 実際に使う追従率。範囲外は (0, 1] に丸め、NaN は既定値。
    pub fn slerp(&self) -> f32 {
        if self.slerp_factor.is_nan() {
            return default_slerp_factor();
        }
        self.slerp_factor.clamp(f32::EPSILON, 1.0)
    }
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            path: default_rig_path(),
            recenter_hips: default_recenter_hips(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            frames_path: default_frames_path(),
            log_interval: default_log_interval(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 読めなければ既定値で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("config not loaded, using defaults: {:#}", e);
                Self::default()
            }
        }
    }
}
