//! Line tokenizer
//!
//! Turns one line of RWX text into a [`Command`]. Bad input never fails:
//! [`tokenize_line`] reports it as [`CommandKind::Unknown`] and [`parse_line`]
//! drops it.

use std::borrow::Cow;

use rwx_math::{Vec2, Vec3};

use crate::command::{
    Command, CommandKind, Face, FaceKind, MaterialDirective, ScopeOp, TextureRef, TransformOp,
};
use crate::material::{
    GeometrySampling, LightSampling, MaterialMode, TextureAddressMode, TextureModes,
};

/// Why a line was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyntaxError {
    #[error("Unknown keyword: {0}")]
    UnknownKeyword(String),

    #[error("Missing argument for `{0}`")]
    MissingArgument(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid value `{value}` for `{keyword}`")]
    InvalidValue { keyword: String, value: String },

    #[error("Unexpected trailing token: {0}")]
    TrailingToken(String),

    #[error("Polygon declares {declared} vertices but lists {found}")]
    PolygonCount { declared: u32, found: usize },
}

type Result<T> = std::result::Result<T, SyntaxError>;

/// Characters allowed in a numeric token
const NUMBER_CHARS: &str = "0123456789+-.eE";

/// Remove a trailing `#` comment. `#!` is kept as a literal `#`.
pub fn strip_comment(line: &str) -> Cow<'_, str> {
    if !line.contains('#') {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '#' {
            if chars.peek() == Some(&'!') {
                chars.next();
                out.push('#');
                continue;
            }
            break;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Parse a line into a command; `None` for blank, unknown or malformed lines
pub fn parse_line(line: &str) -> Option<Command> {
    tokenize_line(line).filter(|cmd| cmd.kind != CommandKind::Unknown)
}

/// Parse a line, reporting malformed input as [`CommandKind::Unknown`].
///
/// Returns `None` only for lines that are blank after comment removal.
pub fn tokenize_line(line: &str) -> Option<Command> {
    match parse_command(line) {
        Ok(None) => None,
        Ok(Some(kind)) => Some(Command::new(kind, line.trim())),
        Err(err) => {
            log::trace!("Ignoring line `{}`: {}", line.trim(), err);
            Some(Command::new(CommandKind::Unknown, line.trim()))
        }
    }
}

/// Parse a line with the rejection reason; `Ok(None)` for blank lines
pub fn parse_command(line: &str) -> Result<Option<CommandKind>> {
    let text = strip_comment(line);
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let Some((&keyword, rest)) = tokens.split_first() else {
        return Ok(None);
    };

    let keyword = keyword.to_ascii_lowercase();
    let mut args = Args::new(&keyword, rest);
    let kind = match keyword.as_str() {
        "vertex" | "vertexext" => parse_vertex(&mut args)?,
        "triangle" | "triangleext" => parse_face(&mut args, FaceKind::Triangle, 3)?,
        "quad" | "quadext" => parse_face(&mut args, FaceKind::Quad, 4)?,
        "polygon" | "polygonext" => parse_polygon(&mut args)?,

        "texture" => CommandKind::Material(MaterialDirective::Texture(parse_texture(&mut args)?)),
        "color" => material(MaterialDirective::Color(args.vec3()?.to_array())),
        "opacity" => material(MaterialDirective::Opacity(args.f32()?)),
        "surface" => {
            let [ambient, diffuse, specular] = args.vec3()?.to_array();
            material(MaterialDirective::Surface { ambient, diffuse, specular })
        }
        "ambient" => material(MaterialDirective::Ambient(args.f32()?)),
        "diffuse" => material(MaterialDirective::Diffuse(args.f32()?)),
        "specular" => material(MaterialDirective::Specular(args.f32()?)),
        "lightsampling" => material(MaterialDirective::LightSampling(args.word(light_sampling)?)),
        "geometrysampling" => {
            material(MaterialDirective::GeometrySampling(args.word(geometry_sampling)?))
        }
        "texturemode" | "texturemodes" => {
            material(MaterialDirective::TextureModes(args.texture_modes(false)?))
        }
        "addtexturemode" | "addtexturemodes" => {
            material(MaterialDirective::AddTextureModes(args.texture_modes(true)?))
        }
        "removetexturemode" | "removetexturemodes" => {
            material(MaterialDirective::RemoveTextureModes(args.texture_modes(true)?))
        }
        "materialmode" | "materialmodes" => {
            let mode = if args.is_empty() { MaterialMode::None } else { args.word(material_mode)? };
            material(MaterialDirective::MaterialMode(mode))
        }
        "addmaterialmode" | "addmaterialmodes" => {
            material(MaterialDirective::AddMaterialMode(args.word(material_mode)?))
        }
        "removematerialmode" | "removematerialmodes" => {
            material(MaterialDirective::RemoveMaterialMode(args.word(material_mode)?))
        }
        "textureaddressmode" => {
            material(MaterialDirective::TextureAddressMode(args.word(address_mode)?))
        }
        "collision" => material(MaterialDirective::Collision(args.word(on_off)?)),
        "tint" => material(MaterialDirective::Tint(args.word(on_off)?)),
        "tag" => material(MaterialDirective::Tag(args.i32()?)),

        "clumpbegin" => CommandKind::Scope(ScopeOp::ClumpBegin),
        "clumpend" => CommandKind::Scope(ScopeOp::ClumpEnd),
        "transformbegin" => CommandKind::Scope(ScopeOp::TransformBegin),
        "transformend" => CommandKind::Scope(ScopeOp::TransformEnd),
        "jointtransformbegin" => CommandKind::Scope(ScopeOp::JointBegin),
        "jointtransformend" => CommandKind::Scope(ScopeOp::JointEnd),
        "identityjoint" => CommandKind::Scope(ScopeOp::IdentityJoint),

        "translate" => CommandKind::Transform(TransformOp::Translate(args.vec3()?)),
        "rotate" => {
            let axis = args.vec3()?;
            let degrees = args.f32()?;
            CommandKind::Transform(TransformOp::Rotate { axis, degrees })
        }
        "scale" => CommandKind::Transform(TransformOp::Scale(args.vec3()?)),
        "identity" => CommandKind::Transform(TransformOp::Identity),
        "transform" => {
            let mut m = [0.0; 16];
            for v in m.iter_mut() {
                *v = args.f32()?;
            }
            CommandKind::Transform(TransformOp::SetMatrix(m))
        }
        "rotatejointtm" => {
            let axis = args.vec3()?;
            let degrees = args.f32()?;
            CommandKind::RotateJoint { axis, degrees }
        }

        _ => return Err(SyntaxError::UnknownKeyword(keyword.clone())),
    };

    args.finish()?;
    Ok(Some(kind))
}

fn material(directive: MaterialDirective) -> CommandKind {
    CommandKind::Material(directive)
}

fn parse_vertex(args: &mut Args<'_>) -> Result<CommandKind> {
    let position = args.vec3()?;
    let uv = if args.eat("uv") {
        Some(Vec2::new(args.f32()?, args.f32()?))
    } else {
        None
    };
    Ok(CommandKind::Vertex { position, uv })
}

fn parse_face(args: &mut Args<'_>, kind: FaceKind, count: usize) -> Result<CommandKind> {
    let indices = (0..count).map(|_| args.u32()).collect::<Result<Vec<_>>>()?;
    let tag = args.tag_suffix()?;
    Ok(CommandKind::Face(Face { kind, indices, tag }))
}

fn parse_polygon(args: &mut Args<'_>) -> Result<CommandKind> {
    let declared = args.u32()?;
    let mut indices = Vec::new();
    while let Some(tok) = args.peek() {
        if tok.eq_ignore_ascii_case("tag") {
            break;
        }
        indices.push(args.u32()?);
    }
    if declared < 3 || indices.len() != declared as usize {
        return Err(SyntaxError::PolygonCount { declared, found: indices.len() });
    }
    let tag = args.tag_suffix()?;
    Ok(CommandKind::Face(Face { kind: FaceKind::Polygon, indices, tag }))
}

fn parse_texture(args: &mut Args<'_>) -> Result<TextureRef> {
    let mut tex = TextureRef { name: args.name()?, ..Default::default() };
    while let Some(attr) = args.next() {
        match attr.to_ascii_lowercase().as_str() {
            "mask" => tex.mask = args.name()?,
            "normal" => tex.normal = args.name()?,
            "specular" => tex.specular = args.name()?,
            "ratio" => tex.ratio = Some(args.f32()?),
            _ => return Err(SyntaxError::TrailingToken(attr.to_string())),
        }
    }
    Ok(tex)
}

fn light_sampling(word: &str) -> Option<LightSampling> {
    match word {
        "facet" => Some(LightSampling::Facet),
        "vertex" => Some(LightSampling::Vertex),
        _ => None,
    }
}

fn geometry_sampling(word: &str) -> Option<GeometrySampling> {
    match word {
        "pointcloud" => Some(GeometrySampling::PointCloud),
        "wireframe" => Some(GeometrySampling::Wireframe),
        "solid" => Some(GeometrySampling::Solid),
        _ => None,
    }
}

fn material_mode(word: &str) -> Option<MaterialMode> {
    match word {
        "none" => Some(MaterialMode::None),
        "null" => Some(MaterialMode::Null),
        "double" => Some(MaterialMode::Double),
        _ => None,
    }
}

fn address_mode(word: &str) -> Option<TextureAddressMode> {
    match word {
        "wrap" => Some(TextureAddressMode::Wrap),
        "mirror" => Some(TextureAddressMode::Mirror),
        "clamp" => Some(TextureAddressMode::Clamp),
        _ => None,
    }
}

fn on_off(word: &str) -> Option<bool> {
    match word {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Parse a float token, rejecting anything outside the numeric alphabet
fn parse_number(tok: &str) -> Result<f32> {
    if tok.is_empty() || !tok.chars().all(|c| NUMBER_CHARS.contains(c)) {
        return Err(SyntaxError::InvalidNumber(tok.to_string()));
    }
    tok.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SyntaxError::InvalidNumber(tok.to_string()))
}

/// Cursor over the arguments following a keyword
struct Args<'a> {
    keyword: &'a str,
    tokens: &'a [&'a str],
    pos: usize,
}

impl<'a> Args<'a> {
    fn new(keyword: &'a str, tokens: &'a [&'a str]) -> Self {
        Self { keyword, tokens, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'a str> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    fn required(&mut self) -> Result<&'a str> {
        self.next()
            .ok_or_else(|| SyntaxError::MissingArgument(self.keyword.to_string()))
    }

    /// Consume the next token if it is `word` (case-insensitive)
    fn eat(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(tok) if tok.eq_ignore_ascii_case(word) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn f32(&mut self) -> Result<f32> {
        parse_number(self.required()?)
    }

    fn vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn u32(&mut self) -> Result<u32> {
        let tok = self.required()?;
        tok.parse().map_err(|_| SyntaxError::InvalidNumber(tok.to_string()))
    }

    fn i32(&mut self) -> Result<i32> {
        let tok = self.required()?;
        tok.parse().map_err(|_| SyntaxError::InvalidNumber(tok.to_string()))
    }

    /// Texture-like name; `null` means none
    fn name(&mut self) -> Result<Option<String>> {
        let tok = self.required()?;
        Ok((!tok.eq_ignore_ascii_case("null")).then(|| tok.to_string()))
    }

    /// Enumeration word mapped through `f`
    fn word<T>(&mut self, f: impl Fn(&str) -> Option<T>) -> Result<T> {
        let tok = self.required()?;
        f(&tok.to_ascii_lowercase()).ok_or_else(|| SyntaxError::InvalidValue {
            keyword: self.keyword.to_string(),
            value: tok.to_string(),
        })
    }

    /// All remaining words as a texture-mode set
    fn texture_modes(&mut self, require_one: bool) -> Result<TextureModes> {
        if require_one && self.is_empty() {
            return Err(SyntaxError::MissingArgument(self.keyword.to_string()));
        }
        let mut modes = TextureModes::NONE;
        while let Some(tok) = self.next() {
            match tok.to_ascii_lowercase().as_str() {
                "null" => {}
                "lit" => modes.lit = true,
                "foreshorten" => modes.foreshorten = true,
                "filter" => modes.filter = true,
                _ => {
                    return Err(SyntaxError::InvalidValue {
                        keyword: self.keyword.to_string(),
                        value: tok.to_string(),
                    })
                }
            }
        }
        Ok(modes)
    }

    /// Optional `tag n` suffix on faces
    fn tag_suffix(&mut self) -> Result<Option<i32>> {
        if self.eat("tag") {
            Ok(Some(self.i32()?))
        } else {
            Ok(None)
        }
    }

    fn finish(&self) -> Result<()> {
        match self.peek() {
            Some(tok) => Err(SyntaxError::TrailingToken(tok.to_string())),
            None => Ok(()),
        }
    }
}
