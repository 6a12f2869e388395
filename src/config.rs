//! Configuration system for the compositor core
//!
//! Loads configuration from TOML file at `~/.config/strata/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::region::GraphicsOrigin;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompositorConfig {
    pub dirty_region: DirtyRegionConfig,
    pub mirror: MirrorConfig,
    pub offscreen: OffscreenConfig,
    pub graphics: GraphicsConfig,
}

impl CompositorConfig {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .context("Failed to read config file")?;

        let config: CompositorConfig = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("strata");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &PathBuf) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let default_config = Self::default();
        let toml_string = toml::to_string_pretty(&default_config)
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Damage-merge policy for the per-screen aggregation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdvancedDirtyPolicy {
    /// Plain union of per-surface and display-level regions.
    #[default]
    Disabled,
    /// Run the rect merger over the whole unioned region.
    SurfaceAndDisplay,
    /// Run the rect merger only on the display-level region.
    DisplayOnly,
}

/// Dirty-region computation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirtyRegionConfig {
    /// Compute per-frame ROI rects for virtual/mirror screens
    pub virtual_dirty_enabled: bool,
    /// Damage-merge policy: "disabled", "surface_and_display", "display_only"
    pub policy: AdvancedDirtyPolicy,
    /// Snap damage rects outward to the alignment grid
    pub align_enabled: bool,
    /// Alignment grid size in pixels
    pub alignment_size: i32,
    /// Collapse a fragmented region to its bound when covered area exceeds
    /// bound area times this threshold (>= 1.0 disables)
    pub clip_rect_threshold: f32,
    /// Rect merger: inputs longer than this collapse to the bounding rect
    pub max_merging_rects: usize,
    /// Rect merger: target output rect count
    pub expected_output_rects: usize,
    /// Rect merger: added-area budget in pixels
    pub max_merge_cost: i64,
    /// Let dirty-free virtual expand screens skip composition entirely
    pub expand_screen_skip_enabled: bool,
}

impl Default for DirtyRegionConfig {
    fn default() -> Self {
        Self {
            virtual_dirty_enabled: true,
            policy: AdvancedDirtyPolicy::Disabled,
            align_enabled: false,
            alignment_size: 128,
            clip_rect_threshold: 0.9,
            max_merging_rects: 20,
            expected_output_rects: 3,
            max_merge_cost: 1_000_000,
            expand_screen_skip_enabled: true,
        }
    }
}

/// Mirror / virtual screen configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Use the SLR scaler for heavy mirror downscales
    pub slr_scale_enabled: bool,
    /// Blit the source screen's cached snapshot when possible
    pub cache_image_enabled: bool,
    /// Debug: always re-walk the scene for mirror output
    pub debug_force_redraw: bool,
    /// Allow the wired projection redraw path
    pub wired_ondraw_enabled: bool,
    /// Wired external screens are trusted with secure content
    pub external_screen_secure: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            slr_scale_enabled: true,
            cache_image_enabled: true,
            debug_force_redraw: false,
            wired_ondraw_enabled: true,
            external_screen_secure: false,
        }
    }
}

/// Offscreen render target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffscreenConfig {
    /// Use a fixed-size offscreen surface across rotation animations
    pub rotate_offscreen_enabled: bool,
    /// Size the rotation surface to the diagonal instead of max(w, h)
    pub cache_optimize_rotate: bool,
    /// Render wide-gamut P3 content through an scRGB offscreen target
    pub scrgb_for_p3: bool,
}

impl Default for OffscreenConfig {
    fn default() -> Self {
        Self {
            rotate_offscreen_enabled: true,
            cache_optimize_rotate: false,
            scrgb_for_p3: false,
        }
    }
}

/// Graphics backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// Damage-rect origin of the display backend: "bottom_left" (GL family)
    /// or "top_left" (Vulkan family)
    pub origin: GraphicsOrigin,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            origin: GraphicsOrigin::BottomLeft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_toml() {
        let config = CompositorConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: CompositorConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.dirty_region.alignment_size, config.dirty_region.alignment_size);
        assert_eq!(parsed.graphics.origin, config.graphics.origin);
        assert_eq!(parsed.dirty_region.policy, AdvancedDirtyPolicy::Disabled);
    }

    #[test]
    fn test_policy_parses_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: AdvancedDirtyPolicy,
        }
        let parsed: Wrapper = toml::from_str("policy = \"surface_and_display\"").unwrap();
        assert_eq!(parsed.policy, AdvancedDirtyPolicy::SurfaceAndDisplay);
    }
}
