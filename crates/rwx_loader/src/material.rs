//! Material state tracking
//!
//! Each clump or transform scope owns a [`MaterialState`]. Directives mutate
//! the top of the stack in place; scope entry clones it and scope exit restores
//! the saved copy. [`MaterialState::signature`] is the canonical key used both
//! to split geometry batches and to cache render materials downstream.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::command::{MaterialDirective, TextureRef};

/// Decimal places used when formatting floats into a signature
pub const SIGNATURE_PRECISION: usize = 6;

/// Lighting model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightSampling {
    #[default]
    Facet,
    Vertex,
}

/// Rasterization mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometrySampling {
    PointCloud,
    Wireframe,
    #[default]
    Solid,
}

/// Material mode (`materialmode none|null|double`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialMode {
    #[default]
    None,
    Null,
    Double,
}

/// Texture sampling mode (`textureaddressmode wrap|mirror|clamp`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureAddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
}

/// Set of texture modes; `texturemodes null` is the empty set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureModes {
    pub lit: bool,
    pub foreshorten: bool,
    pub filter: bool,
}

impl TextureModes {
    pub const NONE: Self = Self { lit: false, foreshorten: false, filter: false };
    pub const ALL: Self = Self { lit: true, foreshorten: true, filter: true };

    pub fn union(self, other: Self) -> Self {
        Self {
            lit: self.lit || other.lit,
            foreshorten: self.foreshorten || other.foreshorten,
            filter: self.filter || other.filter,
        }
    }

    pub fn difference(self, other: Self) -> Self {
        Self {
            lit: self.lit && !other.lit,
            foreshorten: self.foreshorten && !other.foreshorten,
            filter: self.filter && !other.filter,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

impl Default for TextureModes {
    fn default() -> Self {
        Self::ALL
    }
}

/// Texture-name substrings that mark a legacy inverted mask
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskHeuristics {
    pub inverted_mask_substrings: Vec<String>,
}

/// Surface coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
}

impl Default for Surface {
    fn default() -> Self {
        Self { ambient: 0.0, diffuse: 1.0, specular: 0.0 }
    }
}

/// Accumulated material attributes of one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialState {
    /// Set once a `color` directive was seen here or in an ancestor scope
    pub color_explicit: bool,
    pub color: [f32; 3],
    pub opacity: f32,
    pub surface: Surface,
    pub light_sampling: LightSampling,
    pub geometry_sampling: GeometrySampling,
    pub texture_modes: TextureModes,
    pub material_mode: MaterialMode,
    pub texture: Option<String>,
    pub mask: Option<String>,
    pub normal_map: Option<String>,
    pub specular_map: Option<String>,
    pub tint: bool,
    pub texture_address_mode: TextureAddressMode,
    pub collision: bool,
    pub tag: i32,
    pub ratio: f32,
}

impl Default for MaterialState {
    fn default() -> Self {
        Self {
            color_explicit: false,
            color: [1.0, 1.0, 1.0],
            opacity: 1.0,
            surface: Surface::default(),
            light_sampling: LightSampling::default(),
            geometry_sampling: GeometrySampling::default(),
            texture_modes: TextureModes::default(),
            material_mode: MaterialMode::default(),
            texture: None,
            mask: None,
            normal_map: None,
            specular_map: None,
            tint: false,
            texture_address_mode: TextureAddressMode::default(),
            collision: true,
            tag: 0,
            ratio: 1.0,
        }
    }
}

impl MaterialState {
    /// Apply a directive in place
    pub fn apply(&mut self, directive: &MaterialDirective) {
        match directive {
            MaterialDirective::Color(rgb) => {
                self.color = rgb.map(|c| c.clamp(0.0, 1.0));
                self.color_explicit = true;
            }
            MaterialDirective::Opacity(a) => self.opacity = a.clamp(0.0, 1.0),
            MaterialDirective::Surface { ambient, diffuse, specular } => {
                self.surface = Surface {
                    ambient: *ambient,
                    diffuse: *diffuse,
                    specular: *specular,
                };
            }
            MaterialDirective::Ambient(v) => self.surface.ambient = *v,
            MaterialDirective::Diffuse(v) => self.surface.diffuse = *v,
            MaterialDirective::Specular(v) => self.surface.specular = *v,
            MaterialDirective::LightSampling(mode) => self.light_sampling = *mode,
            MaterialDirective::GeometrySampling(mode) => self.geometry_sampling = *mode,
            MaterialDirective::TextureModes(modes) => self.texture_modes = *modes,
            MaterialDirective::AddTextureModes(modes) => {
                self.texture_modes = self.texture_modes.union(*modes);
            }
            MaterialDirective::RemoveTextureModes(modes) => {
                self.texture_modes = self.texture_modes.difference(*modes);
            }
            MaterialDirective::MaterialMode(mode) | MaterialDirective::AddMaterialMode(mode) => {
                self.material_mode = *mode;
            }
            MaterialDirective::RemoveMaterialMode(mode) => {
                if self.material_mode == *mode {
                    self.material_mode = MaterialMode::None;
                }
            }
            MaterialDirective::Texture(tex) => self.set_texture(tex),
            MaterialDirective::TextureAddressMode(mode) => self.texture_address_mode = *mode,
            MaterialDirective::Collision(on) => self.collision = *on,
            MaterialDirective::Tag(tag) => self.tag = *tag,
            MaterialDirective::Tint(on) => self.tint = *on,
        }
    }

    // Attribute maps do not carry over from a previous texture
    fn set_texture(&mut self, tex: &TextureRef) {
        self.texture = tex.name.clone();
        self.mask = tex.mask.clone();
        self.normal_map = tex.normal.clone();
        self.specular_map = tex.specular.clone();
        self.ratio = tex.ratio.unwrap_or(1.0);
    }

    /// RGBA handed to consumers: white unless a color was set, alpha = opacity
    pub fn effective_color(&self) -> [f32; 4] {
        let [r, g, b] = if self.color_explicit { self.color } else { [1.0, 1.0, 1.0] };
        [r, g, b, self.opacity]
    }

    pub fn is_double_sided(&self) -> bool {
        self.material_mode == MaterialMode::Double
    }

    /// Every image name the texture service has to resolve
    pub fn texture_names(&self) -> impl Iterator<Item = &str> {
        [&self.texture, &self.mask, &self.normal_map, &self.specular_map]
            .into_iter()
            .filter_map(|name| name.as_deref())
    }

    /// Whether the mask matches one of the legacy inverted-mask substrings
    pub fn mask_inverted(&self, heuristics: &MaskHeuristics) -> bool {
        let Some(mask) = self.mask.as_deref() else {
            return false;
        };
        let mask = mask.to_ascii_lowercase();
        heuristics
            .inverted_mask_substrings
            .iter()
            .any(|needle| !needle.is_empty() && mask.contains(&needle.to_ascii_lowercase()))
    }

    /// Canonical key; equal for equal field sets
    pub fn signature(&self) -> MaterialSignature {
        let mut key = String::with_capacity(128);
        let p = SIGNATURE_PRECISION;
        // Writing into a String cannot fail
        let _ = write!(
            key,
            "c{}:{:.p$},{:.p$},{:.p$}|o{:.p$}|s{:.p$},{:.p$},{:.p$}|ls{:?}|gs{:?}|tm{}{}{}|mm{:?}",
            u8::from(self.color_explicit),
            canonical(self.color[0]),
            canonical(self.color[1]),
            canonical(self.color[2]),
            canonical(self.opacity),
            canonical(self.surface.ambient),
            canonical(self.surface.diffuse),
            canonical(self.surface.specular),
            self.light_sampling,
            self.geometry_sampling,
            u8::from(self.texture_modes.lit),
            u8::from(self.texture_modes.foreshorten),
            u8::from(self.texture_modes.filter),
            self.material_mode,
        );
        for (label, name) in [
            ("t", &self.texture),
            ("m", &self.mask),
            ("n", &self.normal_map),
            ("sp", &self.specular_map),
        ] {
            match name {
                // Length prefix keeps names containing separators unambiguous
                Some(name) => {
                    let _ = write!(key, "|{}{}:{}", label, name.len(), name);
                }
                None => {
                    let _ = write!(key, "|{}-", label);
                }
            }
        }
        let _ = write!(
            key,
            "|ti{}|ta{:?}|co{}|tg{}|r{:.p$}",
            u8::from(self.tint),
            self.texture_address_mode,
            u8::from(self.collision),
            self.tag,
            canonical(self.ratio),
        );
        MaterialSignature(key)
    }
}

/// Fold `-0.0` into `0.0` so equal fields format identically
#[inline]
fn canonical(v: f32) -> f32 {
    v + 0.0
}

/// Canonical material key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialSignature(String);

impl MaterialSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaterialSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_opaque_white() {
        let m = MaterialState::default();
        assert_eq!(m.effective_color(), [1.0, 1.0, 1.0, 1.0]);
        assert!(!m.is_double_sided());
    }

    #[test]
    fn test_color_keeps_opacity() {
        let mut m = MaterialState::default();
        m.apply(&MaterialDirective::Opacity(0.25));
        m.apply(&MaterialDirective::Color([1.0, 0.0, 0.5]));
        assert_eq!(m.effective_color(), [1.0, 0.0, 0.5, 0.25]);
    }

    #[test]
    fn test_explicit_color_survives_clone() {
        let mut parent = MaterialState::default();
        parent.apply(&MaterialDirective::Color([0.2, 0.3, 0.4]));
        let child = parent.clone();
        assert_eq!(child.effective_color(), [0.2, 0.3, 0.4, 1.0]);
    }

    #[test]
    fn test_signature_equal_for_equal_states() {
        let mut a = MaterialState::default();
        let mut b = MaterialState::default();
        for m in [&mut a, &mut b] {
            m.apply(&MaterialDirective::Color([0.1, 0.2, 0.3]));
            m.apply(&MaterialDirective::Texture(TextureRef {
                name: Some("wood".into()),
                ..Default::default()
            }));
        }
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_signature_tracks_every_field() {
        let base = MaterialState::default();
        let directives = [
            MaterialDirective::Opacity(0.5),
            MaterialDirective::Color([1.0, 1.0, 1.0]),
            MaterialDirective::Ambient(0.3),
            MaterialDirective::LightSampling(LightSampling::Vertex),
            MaterialDirective::GeometrySampling(GeometrySampling::Wireframe),
            MaterialDirective::TextureModes(TextureModes::NONE),
            MaterialDirective::MaterialMode(MaterialMode::Double),
            MaterialDirective::Texture(TextureRef {
                name: Some("brick".into()),
                ..Default::default()
            }),
            MaterialDirective::TextureAddressMode(TextureAddressMode::Clamp),
            MaterialDirective::Collision(false),
            MaterialDirective::Tag(200),
            MaterialDirective::Tint(true),
        ];
        for directive in &directives {
            let mut m = base.clone();
            m.apply(directive);
            assert_ne!(m.signature(), base.signature(), "{:?}", directive);
        }
    }

    #[test]
    fn test_signed_zero_shares_signature() {
        let mut a = MaterialState::default();
        let mut b = MaterialState::default();
        a.apply(&MaterialDirective::Ambient(0.0));
        b.apply(&MaterialDirective::Ambient(-0.0));
        b.apply(&MaterialDirective::Color([-0.0, 1.0, -0.0]));
        a.apply(&MaterialDirective::Color([0.0, 1.0, 0.0]));
        b.ratio = -0.0;
        a.ratio = 0.0;
        assert_eq!(a, b);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_texture_is_not_additive() {
        let mut m = MaterialState::default();
        m.apply(&MaterialDirective::Texture(TextureRef {
            name: Some("leaf".into()),
            mask: Some("leafm".into()),
            normal: Some("leafn".into()),
            ..Default::default()
        }));
        m.apply(&MaterialDirective::Texture(TextureRef {
            name: Some("bark".into()),
            ..Default::default()
        }));
        assert_eq!(m.texture.as_deref(), Some("bark"));
        assert!(m.mask.is_none());
        assert!(m.normal_map.is_none());
        assert_eq!(m.texture_names().collect::<Vec<_>>(), vec!["bark"]);
    }

    #[test]
    fn test_texture_modes_add_remove() {
        let mut m = MaterialState::default();
        m.apply(&MaterialDirective::TextureModes(TextureModes::NONE));
        assert!(m.texture_modes.is_empty());
        m.apply(&MaterialDirective::AddTextureModes(TextureModes {
            lit: true,
            ..TextureModes::NONE
        }));
        assert!(m.texture_modes.lit && !m.texture_modes.filter);
        m.apply(&MaterialDirective::RemoveTextureModes(TextureModes::ALL));
        assert!(m.texture_modes.is_empty());
    }

    #[test]
    fn test_remove_material_mode() {
        let mut m = MaterialState::default();
        m.apply(&MaterialDirective::AddMaterialMode(MaterialMode::Double));
        m.apply(&MaterialDirective::RemoveMaterialMode(MaterialMode::Null));
        assert!(m.is_double_sided());
        m.apply(&MaterialDirective::RemoveMaterialMode(MaterialMode::Double));
        assert_eq!(m.material_mode, MaterialMode::None);
    }

    #[test]
    fn test_mask_inversion_heuristic() {
        let heuristics = MaskHeuristics {
            inverted_mask_substrings: vec!["_INV".into()],
        };
        let mut m = MaterialState::default();
        assert!(!m.mask_inverted(&heuristics));
        m.mask = Some("fence_inv".into());
        assert!(m.mask_inverted(&heuristics));
        assert!(!m.mask_inverted(&MaskHeuristics::default()));
    }
}
