//! Resolution of geographic coordinates to tile file names.

use crate::bounds::BoundRect;
use crate::error::SourceError;
use crate::reader;
use crate::transform::GridTransform;
use crate::Result;
use glob::Pattern;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maps geographic coordinates to the base file names of a tiled source.
pub trait NameResolver {
    /// Glob matching every file name this resolver can produce, used for
    /// whole-directory discovery scans.
    fn fnmatch_pattern(&self) -> String;

    /// Base name of the file expected to contain a point, or `None` when
    /// no candidate exists.
    fn name_for(&mut self, lat: f64, lon: f64) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Lat,
    Lon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rounding {
    Floor,
    Ceil,
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Hemisphere {
        axis: Axis,
        positive: char,
        negative: char,
    },
    Degree {
        axis: Axis,
        rounding: Rounding,
        zero_pad: bool,
        width: usize,
        shift_at_integer: bool,
    },
}

/// Derives tile names from a template with typed placeholders.
///
/// A template mixes literal text (glob wildcards allowed) with `{...}`
/// tokens, each a name and a spec separated by `:`.
///
/// | Token | Meaning |
/// |-------|---------|
/// | `{latHem:ns}` | `n` for latitude >= 0, `s` otherwise (any two letters) |
/// | `{lonHem:ew}` | `e` for longitude >= 0, `w` otherwise |
/// | `{latDegFloor:02}` | absolute value of the floored latitude, zero-padded to the given width |
/// | `{lonDegFloor:03}` | same for longitude |
/// | `{latDegCeil:02}` | ceiling instead of floor |
/// | `{lonDegCeil:03}` | ceiling instead of floor |
///
/// A trailing `x` on a degree spec (`{latDegFloor:02x}`) shifts the result
/// one degree inward when the coordinate is an exact integer, matching
/// conventions that name a tile after its far edge. Rounding is applied to
/// the signed coordinate before taking the absolute value, so `-80.5`
/// floors to `-81` and prints as `081`.
///
/// Rendered names containing wildcards (from literal `*`, `?` or `[`) are
/// resolved against the tile directory; the lexicographically largest
/// match wins and the answer is memoized, so each distinct glob costs one
/// directory scan.
#[derive(Debug)]
pub struct PatternResolver {
    dir: PathBuf,
    parts: Vec<Part>,
    fnmatch: String,
    resolved: HashMap<String, Option<String>>,
}

impl PatternResolver {
    /// Compile a template for tiles under `dir`.
    pub fn new(dir: impl Into<PathBuf>, template: &str) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(SourceError::Configuration(format!(
                "tile directory {} does not exist",
                dir.display()
            )));
        }
        let parts = compile_template(template)?;
        let fnmatch = fnmatch_of(&parts);
        Pattern::new(&fnmatch).map_err(|e| {
            SourceError::Configuration(format!(
                "name template {template:?} yields invalid glob {fnmatch:?}: {e}"
            ))
        })?;
        Ok(Self {
            dir,
            parts,
            fnmatch,
            resolved: HashMap::new(),
        })
    }

    /// Render the name for a point without consulting the directory. The
    /// result may itself be a glob when the template carries wildcard
    /// literals.
    pub fn render(&self, lat: f64, lon: f64) -> String {
        let mut name = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => name.push_str(text),
                Part::Hemisphere {
                    axis,
                    positive,
                    negative,
                } => {
                    let coord = pick(*axis, lat, lon);
                    name.push(if coord >= 0.0 { *positive } else { *negative });
                }
                Part::Degree {
                    axis,
                    rounding,
                    zero_pad,
                    width,
                    shift_at_integer,
                } => {
                    let coord = pick(*axis, lat, lon);
                    let mut deg = match rounding {
                        Rounding::Floor => coord.floor(),
                        Rounding::Ceil => coord.ceil(),
                    } as i64;
                    if *shift_at_integer && coord.fract() == 0.0 {
                        deg += match rounding {
                            Rounding::Floor => -1,
                            Rounding::Ceil => 1,
                        };
                    }
                    let deg = deg.unsigned_abs();
                    if *zero_pad {
                        let _ = write!(name, "{deg:0width$}", width = *width);
                    } else {
                        let _ = write!(name, "{deg:width$}", width = *width);
                    }
                }
            }
        }
        name
    }

    /// One directory scan per distinct rendered glob; the largest match in
    /// lexicographic order wins so that datestamped revisions resolve to
    /// the newest file.
    fn resolve_glob(&self, name: &str) -> Result<Option<String>> {
        let pattern = Pattern::new(name).map_err(|e| {
            SourceError::Configuration(format!("rendered name {name:?} is not a valid glob: {e}"))
        })?;
        let mut best: Option<String> = None;
        for entry in read_dir(&self.dir)? {
            let entry = entry.map_err(|e| SourceError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if pattern.matches(file_name) && best.as_deref().is_none_or(|b| file_name > b) {
                best = Some(file_name.to_string());
            }
        }
        debug!(
            glob = name,
            resolved = best.as_deref().unwrap_or("<none>"),
            "resolved wildcard tile name"
        );
        Ok(best)
    }
}

impl NameResolver for PatternResolver {
    fn fnmatch_pattern(&self) -> String {
        self.fnmatch.clone()
    }

    fn name_for(&mut self, lat: f64, lon: f64) -> Result<Option<String>> {
        let name = self.render(lat, lon);
        if !name.contains(['*', '?', '[']) {
            return Ok(Some(name));
        }
        if let Some(hit) = self.resolved.get(&name) {
            return Ok(hit.clone());
        }
        let resolved = self.resolve_glob(&name)?;
        self.resolved.insert(name, resolved.clone());
        Ok(resolved)
    }
}

fn pick(axis: Axis, lat: f64, lon: f64) -> f64 {
    match axis {
        Axis::Lat => lat,
        Axis::Lon => lon,
    }
}

fn compile_template(template: &str) -> Result<Vec<Part>> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(SourceError::Configuration(format!(
                "unterminated placeholder in name template {template:?}"
            )));
        };
        if !literal.is_empty() {
            parts.push(Part::Literal(std::mem::take(&mut literal)));
        }
        parts.push(parse_token(&after[..close], template)?);
        rest = &after[close + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    if parts.is_empty() {
        return Err(SourceError::Configuration("empty name template".into()));
    }
    Ok(parts)
}

fn parse_token(body: &str, template: &str) -> Result<Part> {
    let Some((name, spec)) = body.split_once(':') else {
        return Err(SourceError::Configuration(format!(
            "placeholder {{{body}}} in name template {template:?} has no spec"
        )));
    };
    match name {
        "latHem" | "lonHem" => {
            let axis = if name == "latHem" { Axis::Lat } else { Axis::Lon };
            let mut chars = spec.chars();
            match (chars.next(), chars.next(), chars.next()) {
                (Some(positive), Some(negative), None) => Ok(Part::Hemisphere {
                    axis,
                    positive,
                    negative,
                }),
                _ => Err(SourceError::Configuration(format!(
                    "hemisphere spec {spec:?} in name template {template:?} must be exactly two letters"
                ))),
            }
        }
        "latDegFloor" | "latDegCeil" | "lonDegFloor" | "lonDegCeil" => {
            let axis = if name.starts_with("lat") {
                Axis::Lat
            } else {
                Axis::Lon
            };
            let rounding = if name.ends_with("Floor") {
                Rounding::Floor
            } else {
                Rounding::Ceil
            };
            let (digits, shift_at_integer) = match spec.strip_suffix('x') {
                Some(head) => (head, true),
                None => (spec, false),
            };
            let zero_pad = digits.starts_with('0');
            let width = if digits.is_empty() {
                0
            } else {
                digits.parse().map_err(|_| {
                    SourceError::Configuration(format!(
                        "bad width {spec:?} for {name} in name template {template:?}"
                    ))
                })?
            };
            Ok(Part::Degree {
                axis,
                rounding,
                zero_pad,
                width,
                shift_at_integer,
            })
        }
        other => Err(SourceError::Configuration(format!(
            "unknown placeholder {other:?} in name template {template:?}"
        ))),
    }
}

/// Discovery glob for a compiled template: hemisphere tokens become
/// character classes, fixed-width degrees become digit classes, and
/// variable-width degrees collapse to `*`.
fn fnmatch_of(parts: &[Part]) -> String {
    let mut glob = String::new();
    for part in parts {
        match part {
            Part::Literal(text) => glob.push_str(text),
            Part::Hemisphere {
                positive, negative, ..
            } => {
                let _ = write!(glob, "[{positive}{negative}]");
            }
            Part::Degree {
                zero_pad, width, ..
            } => {
                if *zero_pad && *width > 0 {
                    for _ in 0..*width {
                        glob.push_str("[0-9]");
                    }
                } else {
                    glob.push('*');
                }
            }
        }
    }
    glob
}

fn read_dir(dir: &Path) -> Result<fs::ReadDir> {
    fs::read_dir(dir).map_err(|e| SourceError::Io {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Resolves names by probing every candidate file up front.
///
/// For directories with no name convention worth compiling: every file
/// matching the glob is opened once at construction, its margin-trimmed
/// bound rectangle recorded, and queries scan the footprints linearly.
/// Start-up pays the cost the pattern resolver avoids, so this suits
/// sources with at most a few dozen files.
pub struct ProbeResolver {
    pattern: String,
    footprints: Vec<(BoundRect, String)>,
}

impl ProbeResolver {
    /// Open every file under `dir` matching `pattern` and record its
    /// footprint. The transform adjuster, when given, runs before the
    /// footprint is derived so rectified and raw geometry never mix.
    pub fn scan(
        dir: &Path,
        pattern: &str,
        adjust: Option<&dyn Fn(&mut GridTransform)>,
    ) -> Result<Self> {
        let compiled = Pattern::new(pattern).map_err(|e| {
            SourceError::Configuration(format!("probe glob {pattern:?} is invalid: {e}"))
        })?;
        let mut footprints = Vec::new();
        for entry in read_dir(dir)? {
            let entry = entry.map_err(|e| SourceError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !compiled.matches(name) {
                continue;
            }
            let mut transform = reader::read_transform(&entry.path())?;
            if let Some(adjust) = adjust {
                adjust(&mut transform);
            }
            footprints.push((transform.bound_rect(), name.to_string()));
        }
        if footprints.is_empty() {
            return Err(SourceError::Configuration(format!(
                "no rasters matching {pattern:?} under {}",
                dir.display()
            )));
        }
        debug!(
            files = footprints.len(),
            dir = %dir.display(),
            "probed raster footprints"
        );
        Ok(Self {
            pattern: pattern.to_string(),
            footprints,
        })
    }
}

impl NameResolver for ProbeResolver {
    fn fnmatch_pattern(&self) -> String {
        self.pattern.clone()
    }

    fn name_for(&mut self, lat: f64, lon: f64) -> Result<Option<String>> {
        Ok(self
            .footprints
            .iter()
            .find(|(rect, _)| rect.contains(lat, lon))
            .map(|(_, name)| name.clone()))
    }
}
