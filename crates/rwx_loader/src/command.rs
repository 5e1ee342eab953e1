//! Typed commands produced by the tokenizer

use rwx_math::{Vec2, Vec3};

use crate::material::{
    GeometrySampling, LightSampling, MaterialMode, TextureAddressMode, TextureModes,
};

/// A single interpreted source line
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// What the line does
    pub kind: CommandKind,
    /// Source text, kept for diagnostics
    pub raw: String,
}

impl Command {
    pub fn new(kind: CommandKind, raw: impl Into<String>) -> Self {
        Self { kind, raw: raw.into() }
    }
}

/// Command variants
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// `vertex x y z [uv u v]`
    Vertex { position: Vec3, uv: Option<Vec2> },
    /// `triangle`, `quad`, `polygon`
    Face(Face),
    /// Any material attribute directive
    Material(MaterialDirective),
    /// Transform composition on the active matrix
    Transform(TransformOp),
    /// Scope push/pop
    Scope(ScopeOp),
    /// `rotatejointtm x y z angle`
    RotateJoint { axis: Vec3, degrees: f32 },
    /// Unrecognized keyword or malformed arguments
    Unknown,
}

/// Face primitive shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceKind {
    Triangle,
    Quad,
    Polygon,
}

/// A face as authored
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub kind: FaceKind,
    /// 1-based vertex indices into the clump-local pool
    pub indices: Vec<u32>,
    /// Per-face `tag n` override
    pub tag: Option<i32>,
}

/// Texture directive with its optional attribute pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureRef {
    /// `None` for `texture null`
    pub name: Option<String>,
    pub mask: Option<String>,
    pub normal: Option<String>,
    pub specular: Option<String>,
    pub ratio: Option<f32>,
}

/// Material attribute update
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialDirective {
    Color([f32; 3]),
    Opacity(f32),
    Surface { ambient: f32, diffuse: f32, specular: f32 },
    Ambient(f32),
    Diffuse(f32),
    Specular(f32),
    LightSampling(LightSampling),
    GeometrySampling(GeometrySampling),
    TextureModes(TextureModes),
    AddTextureModes(TextureModes),
    RemoveTextureModes(TextureModes),
    MaterialMode(MaterialMode),
    AddMaterialMode(MaterialMode),
    RemoveMaterialMode(MaterialMode),
    Texture(TextureRef),
    TextureAddressMode(TextureAddressMode),
    Collision(bool),
    Tag(i32),
    Tint(bool),
}

/// Operations on the active transform matrix
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    Translate(Vec3),
    Rotate { axis: Vec3, degrees: f32 },
    Scale(Vec3),
    /// 16 values, column-major
    SetMatrix([f32; 16]),
    Identity,
}

/// Scope push/pop operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOp {
    ClumpBegin,
    ClumpEnd,
    TransformBegin,
    TransformEnd,
    JointBegin,
    JointEnd,
    IdentityJoint,
}
