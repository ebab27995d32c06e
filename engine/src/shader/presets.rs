//! Built-in shader presets and their GPU uniform layout

use crate::config::ShaderPresetConfig;
use common::{Dimensions, DisplayEffect, ShaderParams, ShaderPreset};

/// Preset used when a requested id is unknown
pub const FALLBACK_PRESET: &str = "none";

fn builtin(id: &str, name: &str, params: ShaderParams) -> ShaderPreset {
    ShaderPreset {
        id: id.to_string(),
        name: name.to_string(),
        params,
    }
}

/// The presets shipped with the engine
pub fn builtin_presets() -> Vec<ShaderPreset> {
    vec![
        builtin("none", "Unfiltered", ShaderParams::default()),
        builtin(
            "vivid",
            "Vivid colors",
            ShaderParams {
                brightness: 0.02,
                contrast: 1.15,
                saturation: 1.35,
                ..Default::default()
            },
        ),
        builtin(
            "lcd",
            "LCD grid",
            ShaderParams {
                saturation: 1.1,
                gamma: 1.1,
                effect: DisplayEffect::Lcd,
                effect_strength: 0.6,
                ..Default::default()
            },
        ),
        builtin(
            "crt",
            "CRT monitor",
            ShaderParams {
                contrast: 1.1,
                effect: DisplayEffect::Crt,
                effect_strength: 0.5,
                curvature: 0.12,
                ..Default::default()
            },
        ),
    ]
}

/// Lookup table of presets by id
#[derive(Debug, Clone)]
pub struct PresetRegistry {
    presets: Vec<ShaderPreset>,
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self {
            presets: builtin_presets(),
        }
    }
}

impl PresetRegistry {
    /// Built-ins overridden or extended by configured presets
    pub fn with_config(configured: &[ShaderPresetConfig]) -> Self {
        let mut registry = Self::default();
        for preset in configured {
            registry.insert(preset.to_preset());
        }
        registry
    }

    /// Add a preset, replacing any existing one with the same id
    pub fn insert(&mut self, preset: ShaderPreset) {
        match self.presets.iter_mut().find(|p| p.id == preset.id) {
            Some(existing) => {
                log::debug!("Overriding built-in preset '{}'", preset.id);
                *existing = preset;
            }
            None => self.presets.push(preset),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ShaderPreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// Look up `id`, falling back to the unfiltered preset
    pub fn resolve(&self, id: &str) -> ShaderPreset {
        if let Some(preset) = self.get(id) {
            return preset.clone();
        }

        log::warn!("Unknown shader preset '{}', using '{}'", id, FALLBACK_PRESET);
        self.get(FALLBACK_PRESET)
            .cloned()
            .unwrap_or_else(|| builtin(FALLBACK_PRESET, "Unfiltered", ShaderParams::default()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.id.as_str())
    }
}

/// Uniform block shared by the color, upscale and effect passes
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShaderUniforms {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub gamma: f32,
    pub effect_strength: f32,
    pub curvature: f32,
    pub effect: u32,
    pub scale: f32,
    pub source_width: f32,
    pub source_height: f32,
    pub target_width: f32,
    pub target_height: f32,
}

impl ShaderUniforms {
    pub fn new(params: &ShaderParams, source: Dimensions, target: Dimensions) -> Self {
        let scale = if source.width == 0 {
            1.0
        } else {
            target.width as f32 / source.width as f32
        };

        Self {
            brightness: params.brightness,
            contrast: params.contrast,
            saturation: params.saturation,
            gamma: params.gamma.max(0.01),
            effect_strength: params.effect_strength.clamp(0.0, 1.0),
            curvature: params.curvature.clamp(0.0, 0.5),
            effect: params.effect.shader_index(),
            scale,
            source_width: source.width as f32,
            source_height: source.height as f32,
            target_width: target.width as f32,
            target_height: target.height as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let registry = PresetRegistry::default();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["none", "vivid", "lcd", "crt"]);
        assert!(registry.get("none").unwrap().params.is_identity());
        assert_eq!(
            registry.get("lcd").unwrap().params.effect,
            DisplayEffect::Lcd
        );
    }

    #[test]
    fn test_config_overrides_and_extends() {
        let configured = vec![
            ShaderPresetConfig {
                id: "lcd".to_string(),
                name: "Sharper grid".to_string(),
                brightness: None,
                contrast: None,
                saturation: None,
                gamma: None,
                effect: Some("lcd".to_string()),
                effect_strength: Some(0.9),
                curvature: None,
            },
            ShaderPresetConfig {
                id: "mono".to_string(),
                name: String::new(),
                brightness: None,
                contrast: None,
                saturation: Some(0.0),
                gamma: None,
                effect: None,
                effect_strength: None,
                curvature: None,
            },
        ];

        let registry = PresetRegistry::with_config(&configured);
        assert_eq!(registry.ids().count(), 5);
        assert_eq!(registry.get("lcd").unwrap().name, "Sharper grid");
        assert_eq!(registry.get("lcd").unwrap().params.effect_strength, 0.9);
        assert_eq!(registry.get("mono").unwrap().params.saturation, 0.0);
    }

    #[test]
    fn test_resolve_unknown_falls_back() {
        let registry = PresetRegistry::default();
        assert_eq!(registry.resolve("hologram").id, FALLBACK_PRESET);
        assert_eq!(registry.resolve("crt").id, "crt");
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<ShaderUniforms>(), 48);

        let params = ShaderParams {
            effect: DisplayEffect::Crt,
            curvature: 2.0,
            ..Default::default()
        };
        let uniforms = ShaderUniforms::new(
            &params,
            Dimensions::native(),
            Dimensions::native().scaled(4),
        );
        assert_eq!(uniforms.effect, 1);
        assert_eq!(uniforms.scale, 4.0);
        assert_eq!(uniforms.curvature, 0.5);
        assert_eq!(bytemuck::bytes_of(&uniforms).len(), 48);
    }
}
