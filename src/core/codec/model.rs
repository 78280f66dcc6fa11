//! 3D model codec
//!
//! Models are stored as their original bytes (LOD 0) followed by any
//! generated levels of detail. Simplification is heuristic:
//!
//! - OBJ: vertex clustering on a uniform grid that coarsens each level
//! - STL: facet decimation, keeping every other triangle
//!
//! Other formats keep a single LOD. Animation tracks are read from glTF and
//! GLB; vertex positions can be pulled out of OBJ, ASCII STL and ASCII PLY.

use super::numeric::NumericArray;
use super::{le_u32, EntryCodec};
use crate::catalog::{AnimationTrack, ByteRange, Category, Metadata, ModelFormat, ModelInfo};
use crate::error::{ArchiveError, Result};
use crate::registry::{self, is_binary_stl, Format};
use ahash::{AHashMap, AHashSet};
use serde_json::Value;
use std::fmt::Write as _;
use tracing::{debug, trace};

pub struct ModelCodec;

impl EntryCodec for ModelCodec {
    fn validate(&self, ext: Option<&str>, payload: &[u8]) -> Result<Option<Format>> {
        registry::validate(Category::Model, ext, payload).map(Some)
    }

    fn extract_metadata(&self, payload: &[u8], format: Option<Format>) -> Result<Option<Metadata>> {
        let Some(Format::Model(format)) = format else {
            return Err(ArchiveError::validation("model format was not detected"));
        };
        let animations = match format {
            ModelFormat::Gltf | ModelFormat::Glb => {
                let (json, bin) = gltf_parts(payload, format)?;
                animation_tracks(&json, bin)
            }
            _ => Vec::new(),
        };
        Ok(Some(Metadata::Model(ModelInfo {
            format,
            lods: vec![ByteRange::new(0, payload.len() as u64)],
            animations,
            vertex_count: vertex_count(payload, format),
        })))
    }
}

/// Append generated LODs to `original`
///
/// Returns the stored payload and one range per level. Generation stops at
/// the first level that cannot be produced or is no smaller than the last.
pub fn build_lods(
    format: ModelFormat,
    original: Vec<u8>,
    levels: usize,
    optimize: bool,
) -> (Vec<u8>, Vec<ByteRange>) {
    let mut lods = vec![ByteRange::new(0, original.len() as u64)];
    let mut payload = original;
    if !optimize || levels <= 1 {
        return (payload, lods);
    }

    let mut previous = payload.clone();
    for level in 1..levels {
        let simplified = match format {
            ModelFormat::Obj => simplify_obj(&previous, level),
            ModelFormat::Stl => decimate_stl(&previous),
            _ => None,
        };
        let Some(simplified) = simplified.filter(|s| s.len() < previous.len()) else {
            debug!(
                "{:?} LOD generation stopped after {} of {} levels",
                format,
                lods.len(),
                levels
            );
            break;
        };

        lods.push(ByteRange::new(payload.len() as u64, simplified.len() as u64));
        payload.extend_from_slice(&simplified);
        previous = simplified;
    }
    (payload, lods)
}

/// Resolve an OBJ face vertex reference (1-based, or negative = relative)
fn obj_index(token: &str, defined: usize) -> Option<usize> {
    let index: i64 = token.split('/').next()?.parse().ok()?;
    match index {
        i if i > 0 => Some(i as usize - 1),
        i if i < 0 => defined.checked_sub(i.unsigned_abs() as usize),
        _ => None,
    }
}

fn parse_floats<'a>(fields: impl Iterator<Item = &'a str>) -> Option<[f32; 3]> {
    let mut out = [0.0f32; 3];
    let mut fields = fields;
    for slot in &mut out {
        *slot = fields.next()?.parse().ok()?;
    }
    Some(out)
}

struct ObjMesh {
    vertices: Vec<[f32; 3]>,
    faces: Vec<Vec<usize>>,
}

fn parse_obj(text: &str) -> ObjMesh {
    let mut mesh = ObjMesh {
        vertices: Vec::new(),
        faces: Vec::new(),
    };
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                if let Some(v) = parse_floats(fields) {
                    mesh.vertices.push(v);
                }
            }
            Some("f") => {
                let defined = mesh.vertices.len();
                let face: Option<Vec<usize>> = fields.map(|t| obj_index(t, defined)).collect();
                if let Some(face) = face.filter(|f| f.len() >= 3) {
                    mesh.faces.push(face);
                }
            }
            _ => {}
        }
    }
    mesh
}

/// Cluster vertices on a grid and rebuild faces against the cluster centroids
fn simplify_obj(bytes: &[u8], level: usize) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mesh = parse_obj(text);
    if mesh.vertices.len() < 4 || mesh.faces.is_empty() {
        return None;
    }

    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for v in &mesh.vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(v[axis]);
            max[axis] = max[axis].max(v[axis]);
        }
    }

    // Roughly halve the grid resolution per level
    let cells = (((mesh.vertices.len() as f64).cbrt() / (1 << level) as f64).floor() as usize).max(1);
    let cell_of = |v: &[f32; 3]| -> [usize; 3] {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let extent = max[axis] - min[axis];
            if extent > 0.0 {
                let t = (v[axis] - min[axis]) / extent;
                cell[axis] = ((t * cells as f32) as usize).min(cells - 1);
            }
        }
        cell
    };

    let mut cluster_of_cell: AHashMap<[usize; 3], usize> = AHashMap::new();
    let mut sums: Vec<([f64; 3], usize)> = Vec::new();
    let remap: Vec<usize> = mesh
        .vertices
        .iter()
        .map(|v| {
            let id = *cluster_of_cell.entry(cell_of(v)).or_insert_with(|| {
                sums.push(([0.0; 3], 0));
                sums.len() - 1
            });
            for axis in 0..3 {
                sums[id].0[axis] += v[axis] as f64;
            }
            sums[id].1 += 1;
            id
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "# lod {} ({} clusters)", level, sums.len());
    for (sum, count) in &sums {
        let n = *count as f64;
        let _ = writeln!(out, "v {} {} {}", sum[0] / n, sum[1] / n, sum[2] / n);
    }

    let mut seen = AHashSet::new();
    let mut kept = 0;
    for face in &mesh.faces {
        let mut clustered: Vec<usize> = Vec::with_capacity(face.len());
        for &index in face {
            let id = remap[index.min(remap.len() - 1)];
            if !clustered.contains(&id) {
                clustered.push(id);
            }
        }
        let mut key = clustered.clone();
        key.sort_unstable();
        if clustered.len() >= 3 && seen.insert(key) {
            out.push('f');
            for id in clustered {
                let _ = write!(out, " {}", id + 1);
            }
            out.push('\n');
            kept += 1;
        }
    }
    trace!(
        "OBJ lod {}: {} -> {} vertices, {} -> {} faces",
        level,
        mesh.vertices.len(),
        sums.len(),
        mesh.faces.len(),
        kept
    );

    (kept > 0).then(|| out.into_bytes())
}

/// Keep every other facet of a binary or ASCII STL
fn decimate_stl(bytes: &[u8]) -> Option<Vec<u8>> {
    if is_binary_stl(bytes) {
        let count = le_u32(bytes, 80)? as usize;
        if count < 2 {
            return None;
        }
        let kept = (count + 1) / 2;
        let mut out = Vec::with_capacity(84 + kept * 50);
        out.extend_from_slice(&bytes[..80]);
        out.extend_from_slice(&(kept as u32).to_le_bytes());
        for facet in bytes[84..].chunks_exact(50).step_by(2) {
            out.extend_from_slice(facet);
        }
        return Some(out);
    }

    let text = std::str::from_utf8(bytes).ok()?;
    let mut header = None;
    let mut footer = None;
    let mut facets: Vec<Vec<&str>> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("endsolid") {
            footer = Some(line);
        } else if trimmed.starts_with("solid") {
            header = Some(line);
        } else if trimmed.starts_with("facet") {
            current = Some(vec![line]);
        } else if let Some(facet) = current.as_mut() {
            facet.push(line);
            if trimmed.starts_with("endfacet") {
                facets.extend(current.take());
            }
        }
    }
    if facets.len() < 2 {
        return None;
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", header.unwrap_or("solid"));
    for facet in facets.iter().step_by(2) {
        for line in facet {
            let _ = writeln!(out, "{}", line);
        }
    }
    let _ = writeln!(out, "{}", footer.unwrap_or("endsolid"));
    Some(out.into_bytes())
}

/// glTF JSON document and, for GLB, the binary chunk
fn gltf_parts(bytes: &[u8], format: ModelFormat) -> Result<(Value, Option<&[u8]>)> {
    if format == ModelFormat::Gltf {
        let json = serde_json::from_slice(bytes)
            .map_err(|e| ArchiveError::validation(format!("glTF JSON: {}", e)))?;
        return Ok((json, None));
    }

    let invalid = |what: &str| ArchiveError::validation(format!("GLB {}", what));
    let json_len = le_u32(bytes, 12).ok_or_else(|| invalid("header is truncated"))? as usize;
    if bytes.get(16..20) != Some(b"JSON") {
        return Err(invalid("first chunk is not JSON"));
    }
    let json_end = 20usize
        .checked_add(json_len)
        .ok_or_else(|| invalid("JSON chunk overflows"))?;
    let json_bytes = bytes
        .get(20..json_end)
        .ok_or_else(|| invalid("JSON chunk is truncated"))?;
    let json = serde_json::from_slice(json_bytes)
        .map_err(|e| ArchiveError::validation(format!("GLB JSON: {}", e)))?;

    let bin = le_u32(bytes, json_end).and_then(|bin_len| {
        let bin_start = json_end.checked_add(8)?;
        let bin_end = bin_start.checked_add(usize::try_from(bin_len).ok()?)?;
        (bytes.get(json_end + 4..bin_start)? == b"BIN\0")
            .then(|| bytes.get(bin_start..bin_end))
            .flatten()
    });
    Ok((json, bin))
}

/// Float elements of an accessor inside the GLB binary chunk
fn accessor_floats(json: &Value, bin: &[u8], accessor: usize) -> Option<Vec<Vec<f32>>> {
    let acc = json["accessors"].get(accessor)?;
    // FLOAT only
    if acc["componentType"].as_u64()? != 5126 {
        return None;
    }
    let width = match acc["type"].as_str()? {
        "SCALAR" => 1,
        "VEC2" => 2,
        "VEC3" => 3,
        "VEC4" => 4,
        _ => return None,
    };
    let count = usize::try_from(acc["count"].as_u64()?).ok()?;
    let view = json["bufferViews"].get(usize::try_from(acc["bufferView"].as_u64()?).ok()?)?;
    let base = usize::try_from(view["byteOffset"].as_u64().unwrap_or(0))
        .ok()?
        .checked_add(usize::try_from(acc["byteOffset"].as_u64().unwrap_or(0)).ok()?)?;
    let stride = match view["byteStride"].as_u64() {
        Some(s) => usize::try_from(s).ok()?,
        None => width * 4,
    };

    (0..count)
        .map(|i| -> Option<Vec<f32>> {
            let at = i.checked_mul(stride)?.checked_add(base)?;
            (0..width)
                .map(|c| le_u32(bin, at.checked_add(c * 4)?).map(f32::from_bits))
                .collect()
        })
        .collect()
}

/// Named tracks from a glTF document's `animations` array
fn animation_tracks(json: &Value, bin: Option<&[u8]>) -> Vec<AnimationTrack> {
    let Some(animations) = json["animations"].as_array() else {
        return Vec::new();
    };

    animations
        .iter()
        .enumerate()
        .map(|(i, animation)| {
            let name = animation["name"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("animation_{}", i));
            let samplers = animation["samplers"].as_array().cloned().unwrap_or_default();

            let frame_count = samplers
                .iter()
                .filter_map(|s| s["input"].as_u64())
                .filter_map(|input| json["accessors"].get(input as usize)?["count"].as_u64())
                .max()
                .unwrap_or(0);

            // Per-frame data: every sampler's output element for that frame, concatenated
            let outputs: Vec<Vec<Vec<f32>>> = bin
                .map(|bin| {
                    samplers
                        .iter()
                        .filter_map(|s| accessor_floats(json, bin, s["output"].as_u64()? as usize))
                        .collect()
                })
                .unwrap_or_default();
            // Frames past the longest decoded output carry no data
            let decoded = outputs.iter().map(Vec::len).max().unwrap_or(0);
            let frames: Vec<Vec<f32>> = if outputs.is_empty() {
                Vec::new()
            } else {
                (0..decoded.min(usize::try_from(frame_count).unwrap_or(usize::MAX)))
                    .map(|f| {
                        outputs
                            .iter()
                            .filter_map(|output| output.get(f))
                            .flatten()
                            .copied()
                            .collect()
                    })
                    .collect()
            };

            AnimationTrack {
                name,
                frame_count: u32::try_from(frame_count).unwrap_or(u32::MAX),
                frames,
            }
        })
        .collect()
}

/// Vertex count where the format states it or it is cheap to count
pub fn vertex_count(bytes: &[u8], format: ModelFormat) -> Option<u64> {
    match format {
        ModelFormat::Obj => {
            let text = std::str::from_utf8(bytes).ok()?;
            Some(text.lines().filter(|l| l.trim_start().starts_with("v ")).count() as u64)
        }
        ModelFormat::Stl if is_binary_stl(bytes) => le_u32(bytes, 80).map(|n| n as u64 * 3),
        ModelFormat::Stl => {
            let text = std::str::from_utf8(bytes).ok()?;
            Some(text.lines().filter(|l| l.trim_start().starts_with("vertex")).count() as u64)
        }
        ModelFormat::Ply => PlyHeader::parse(bytes).map(|h| h.vertex_count as u64),
        ModelFormat::Gltf | ModelFormat::Glb => {
            let (json, _) = gltf_parts(bytes, format).ok()?;
            let total = json["meshes"]
                .as_array()?
                .iter()
                .flat_map(|mesh| mesh["primitives"].as_array().cloned().unwrap_or_default())
                .filter_map(|p| p["attributes"]["POSITION"].as_u64())
                .filter_map(|acc| json["accessors"].get(acc as usize)?["count"].as_u64())
                .try_fold(0u64, u64::checked_add)?;
            Some(total)
        }
        _ => None,
    }
}

struct PlyHeader<'a> {
    ascii: bool,
    /// Lines of elements that precede the vertex element
    lines_before_vertices: usize,
    vertex_count: usize,
    /// Column of x, y and z within a vertex line
    xyz: Option<[usize; 3]>,
    body: &'a str,
}

impl<'a> PlyHeader<'a> {
    fn parse(bytes: &'a [u8]) -> Option<Self> {
        let end = bytes.windows(10).position(|w| w == b"end_header")?;
        let header = std::str::from_utf8(&bytes[..end]).ok()?;
        let body_start = bytes[end..].iter().position(|&b| b == b'\n').map(|p| end + p + 1)?;
        // The body of a binary file is not UTF-8; only ASCII bodies are kept
        let body = std::str::from_utf8(&bytes[body_start..]).unwrap_or("");

        let mut ascii = false;
        let mut lines_before_vertices: usize = 0;
        let mut vertex_count = None;
        let mut properties: Vec<&str> = Vec::new();
        let mut in_vertex = false;

        for line in header.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                ["format", kind, ..] => ascii = *kind == "ascii",
                ["element", name, count] => {
                    let count: usize = count.parse().ok()?;
                    in_vertex = *name == "vertex";
                    if in_vertex {
                        vertex_count = Some(count);
                    } else if vertex_count.is_none() {
                        lines_before_vertices = lines_before_vertices.saturating_add(count);
                    }
                }
                ["property", .., name] if in_vertex => properties.push(*name),
                _ => {}
            }
        }

        let column = |axis: &str| properties.iter().position(|p| *p == axis);
        let xyz = match (column("x"), column("y"), column("z")) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        };
        Some(PlyHeader {
            ascii,
            lines_before_vertices,
            vertex_count: vertex_count?,
            xyz,
            body,
        })
    }
}

/// Vertex positions as an `[n, 3]` `f32` array
pub fn extract_vertices(bytes: &[u8], format: ModelFormat) -> Result<NumericArray> {
    let unsupported = |what: &str| ArchiveError::UnsupportedFormat(format!("vertex extraction from {}", what));
    let malformed = |what: &str| ArchiveError::format(format!("{} vertex data is malformed", what));

    let vertices: Vec<[f32; 3]> = match format {
        ModelFormat::Obj => {
            let text = std::str::from_utf8(bytes).map_err(|_| malformed("OBJ"))?;
            parse_obj(text).vertices
        }
        ModelFormat::Stl if !is_binary_stl(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| malformed("STL"))?;
            text.lines()
                .filter_map(|line| {
                    let mut fields = line.split_whitespace();
                    (fields.next() == Some("vertex")).then(|| parse_floats(fields))?
                })
                .collect()
        }
        ModelFormat::Ply => {
            let header = PlyHeader::parse(bytes).ok_or_else(|| malformed("PLY"))?;
            if !header.ascii {
                return Err(unsupported("binary PLY"));
            }
            let [x, y, z] = header.xyz.ok_or_else(|| malformed("PLY"))?;
            header
                .body
                .lines()
                .skip(header.lines_before_vertices)
                .take(header.vertex_count)
                .map(|line| {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    let get = |i: usize| fields.get(i)?.parse::<f32>().ok();
                    Some([get(x)?, get(y)?, get(z)?])
                })
                .collect::<Option<Vec<_>>>()
                .filter(|v| v.len() == header.vertex_count)
                .ok_or_else(|| malformed("PLY"))?
        }
        ModelFormat::Stl => return Err(unsupported("binary STL")),
        other => return Err(unsupported(&format!("{:?}", other))),
    };

    let flat: Vec<f32> = vertices.iter().flatten().copied().collect();
    NumericArray::from_f32(vec![vertices.len(), 3], &flat)
}

/// Insert `track`, replacing an existing track with the same name in place
pub fn upsert_track(info: &mut ModelInfo, track: AnimationTrack) {
    match info.animations.iter_mut().find(|t| t.name == track.name) {
        Some(existing) => *existing = track,
        None => info.animations.push(track),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_obj(n: usize) -> Vec<u8> {
        let mut out = String::new();
        for y in 0..n {
            for x in 0..n {
                let _ = writeln!(out, "v {} {} 0", x, y);
            }
        }
        for y in 0..n - 1 {
            for x in 0..n - 1 {
                let i = y * n + x + 1;
                let _ = writeln!(out, "f {} {} {}", i, i + 1, i + n);
                let _ = writeln!(out, "f {} {} {}", i + 1, i + n + 1, i + n);
            }
        }
        out.into_bytes()
    }

    fn binary_stl(facets: u32) -> Vec<u8> {
        let mut out = vec![0u8; 80];
        out.extend_from_slice(&facets.to_le_bytes());
        for i in 0..facets {
            let mut facet = vec![0u8; 50];
            facet[12..16].copy_from_slice(&(i as f32).to_le_bytes());
            out.extend_from_slice(&facet);
        }
        out
    }

    fn build_glb(json: &[u8], bin: &[u8]) -> Vec<u8> {
        let mut json = json.to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut glb = b"glTF".to_vec();
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&((12 + 8 + json.len() + 8 + bin.len()) as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(bin);
        glb
    }

    const ASCII_STL: &str = "solid cube\n\
        facet normal 0 0 1\n outer loop\n  vertex 0 0 0\n  vertex 1 0 0\n  vertex 0 1 0\n endloop\nendfacet\n\
        facet normal 0 0 1\n outer loop\n  vertex 1 0 0\n  vertex 1 1 0\n  vertex 0 1 0\n endloop\nendfacet\n\
        facet normal 0 0 -1\n outer loop\n  vertex 0 0 1\n  vertex 1 0 1\n  vertex 0 1 1\n endloop\nendfacet\n\
        endsolid cube\n";

    #[test]
    fn test_obj_index_resolution() {
        assert_eq!(obj_index("1", 3), Some(0));
        assert_eq!(obj_index("3/1/2", 3), Some(2));
        assert_eq!(obj_index("-1", 3), Some(2));
        assert_eq!(obj_index("-4", 3), None);
        assert_eq!(obj_index("0", 3), None);
    }

    #[test]
    fn test_no_lods_without_optimize() {
        let obj = grid_obj(8);
        let len = obj.len() as u64;
        let (payload, lods) = build_lods(ModelFormat::Obj, obj.clone(), 4, false);
        assert_eq!(payload, obj);
        assert_eq!(lods, vec![ByteRange::new(0, len)]);
    }

    #[test]
    fn test_obj_lods_shrink() {
        let obj = grid_obj(16);
        let (payload, lods) = build_lods(ModelFormat::Obj, obj.clone(), 3, true);
        assert!(lods.len() >= 2);
        assert_eq!(lods[0].slice(&payload), Some(&obj[..]));
        for pair in lods.windows(2) {
            assert!(pair[1].len < pair[0].len);
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].len);
        }
        let lod1 = std::str::from_utf8(lods[1].slice(&payload).unwrap()).unwrap();
        assert!(lod1.lines().any(|l| l.starts_with("f ")));
    }

    #[test]
    fn test_binary_stl_decimation() {
        let stl = binary_stl(5);
        let (payload, lods) = build_lods(ModelFormat::Stl, stl, 2, true);
        assert_eq!(lods.len(), 2);
        let lod1 = lods[1].slice(&payload).unwrap();
        assert!(is_binary_stl(lod1));
        assert_eq!(le_u32(lod1, 80), Some(3));
    }

    #[test]
    fn test_ascii_stl_decimation_and_early_stop() {
        let (payload, lods) = build_lods(ModelFormat::Stl, ASCII_STL.as_bytes().to_vec(), 5, true);
        // 3 facets -> 2 -> 1, then no further level
        assert_eq!(lods.len(), 3);
        let last = std::str::from_utf8(lods[2].slice(&payload).unwrap()).unwrap();
        assert_eq!(last.matches("endfacet").count(), 1);
        assert!(last.starts_with("solid cube"));
        assert!(last.trim_end().ends_with("endsolid cube"));
    }

    #[test]
    fn test_formats_without_rule_keep_one_lod() {
        let (_, lods) = build_lods(ModelFormat::Fbx, b"; FBX 7.4.0 project file".to_vec(), 3, true);
        assert_eq!(lods.len(), 1);
    }

    #[test]
    fn test_gltf_animation_tracks() -> Result<()> {
        let gltf = br#"{
            "asset": {"version": "2.0"},
            "accessors": [{"count": 10}, {"count": 24}, {"count": 3}],
            "animations": [
                {"name": "walk", "samplers": [{"input": 0, "output": 2}, {"input": 1, "output": 2}]},
                {"samplers": [{"input": 2, "output": 2}]}
            ]
        }"#;
        let meta = ModelCodec.extract_metadata(gltf, Some(Format::Model(ModelFormat::Gltf)))?;
        let info = meta.as_ref().and_then(Metadata::as_model).unwrap();
        assert_eq!(info.animations.len(), 2);
        assert_eq!(info.animations[0].name, "walk");
        assert_eq!(info.animations[0].frame_count, 24);
        assert_eq!(info.animations[1].name, "animation_1");
        assert_eq!(info.animations[1].frame_count, 3);
        Ok(())
    }

    #[test]
    fn test_glb_animation_frames() -> Result<()> {
        let json = br#"{"asset":{"version":"2.0"},
            "bufferViews":[{"buffer":0,"byteOffset":0,"byteLength":8},{"buffer":0,"byteOffset":8,"byteLength":8}],
            "accessors":[
                {"bufferView":0,"componentType":5126,"count":2,"type":"SCALAR"},
                {"bufferView":1,"componentType":5126,"count":2,"type":"SCALAR"}],
            "animations":[{"name":"bob","samplers":[{"input":0,"output":1}]}]}"#;
        let bin: Vec<u8> = [0.0f32, 1.0, 0.5, 2.5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let glb = build_glb(json, &bin);

        let meta = ModelCodec.extract_metadata(&glb, Some(Format::Model(ModelFormat::Glb)))?;
        let info = meta.as_ref().and_then(Metadata::as_model).unwrap();
        assert_eq!(info.animations[0].frames, vec![vec![0.5], vec![2.5]]);
        Ok(())
    }

    #[test]
    fn test_glb_offsets_near_u64_max() -> Result<()> {
        let json = br#"{"asset":{"version":"2.0"},
            "bufferViews":[{"buffer":0,"byteOffset":18446744073709551615,"byteLength":8}],
            "accessors":[
                {"bufferView":0,"byteOffset":1,"componentType":5126,"count":2,"type":"SCALAR"},
                {"bufferView":0,"componentType":5126,"count":2,"type":"SCALAR","byteStride":0}],
            "meshes":[{"primitives":[{"attributes":{"POSITION":0}},{"attributes":{"POSITION":0}}]}],
            "animations":[{"name":"far","samplers":[{"input":0,"output":1}]}]}"#;
        let glb = build_glb(json, &[0u8; 8]);

        let meta = ModelCodec.extract_metadata(&glb, Some(Format::Model(ModelFormat::Glb)))?;
        let info = meta.as_ref().and_then(Metadata::as_model).unwrap();
        assert_eq!(info.animations[0].name, "far");
        assert!(info.animations[0].frames.is_empty());
        Ok(())
    }

    #[test]
    fn test_declared_frames_capped_by_decoded_output() -> Result<()> {
        let json = br#"{"asset":{"version":"2.0"},
            "bufferViews":[{"buffer":0,"byteOffset":0,"byteLength":8}],
            "accessors":[
                {"bufferView":0,"componentType":5126,"count":99999999999,"type":"SCALAR"},
                {"bufferView":0,"componentType":5126,"count":2,"type":"SCALAR"}],
            "animations":[{"name":"huge","samplers":[{"input":0,"output":1}]}]}"#;
        let bin: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let glb = build_glb(json, &bin);

        let meta = ModelCodec.extract_metadata(&glb, Some(Format::Model(ModelFormat::Glb)))?;
        let track = &meta.as_ref().and_then(Metadata::as_model).unwrap().animations[0];
        assert_eq!(track.frame_count, u32::MAX);
        assert_eq!(track.frames, vec![vec![1.0], vec![2.0]]);
        Ok(())
    }

    #[test]
    fn test_extract_obj_and_stl_vertices() -> Result<()> {
        let obj = b"# tri\nv 1 2 3\nv 4.5 5 6\nvn 0 0 1\nv 7 8 9\nf 1 2 3\n";
        let array = extract_vertices(obj, ModelFormat::Obj)?;
        assert_eq!(array.shape, vec![3, 3]);
        assert_eq!(array.as_f32()?[3], 4.5);

        let array = extract_vertices(ASCII_STL.as_bytes(), ModelFormat::Stl)?;
        assert_eq!(array.shape, vec![9, 3]);
        Ok(())
    }

    #[test]
    fn test_extract_ply_vertices() -> Result<()> {
        let ply = b"ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nproperty uchar red\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 1 2 255\n3 4 5 0\n3 0 1 1\n";
        let array = extract_vertices(ply, ModelFormat::Ply)?;
        assert_eq!(array.as_f32()?, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(vertex_count(ply, ModelFormat::Ply), Some(2));
        Ok(())
    }

    #[test]
    fn test_extract_unsupported_formats() {
        assert!(matches!(
            extract_vertices(&binary_stl(1), ModelFormat::Stl),
            Err(ArchiveError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            extract_vertices(b"glTF", ModelFormat::Glb),
            Err(ArchiveError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_upsert_track_replaces_by_name() {
        let mut info = ModelInfo {
            format: ModelFormat::Gltf,
            lods: vec![],
            animations: vec![AnimationTrack::new("idle", vec![vec![0.0]])],
            vertex_count: None,
        };
        upsert_track(&mut info, AnimationTrack::new("run", vec![vec![1.0], vec![2.0]]));
        upsert_track(&mut info, AnimationTrack::new("idle", vec![vec![3.0]; 4]));

        assert_eq!(info.animations.len(), 2);
        assert_eq!(info.animations[0].name, "idle");
        assert_eq!(info.animations[0].frame_count, 4);
        assert_eq!(info.animations[1].frame_count, 2);
    }
}
