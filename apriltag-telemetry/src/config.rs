use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ads_apriltag::{DetectorParams, FamilyType};

use crate::{
    detector::CameraIntrinsics,
    gate::QualityGate,
    miss::MissPolicy,
    pipeline::PipelineSettings,
    selection::SelectionStrategy,
    source::SourceDescriptor,
    telemetry::{DEFAULT_BRIDGE_ADDR, DEFAULT_TABLE_NAME},
    Error, Result,
};

/// The default value for [TelemetryConfig::tag_size_meters].
pub const DEFAULT_TAG_SIZE_METERS: f64 = 0.1397;

/// The default value for [OutputConfig::record_fps].
pub const DEFAULT_RECORD_FPS: u32 = 30;

fn default_tag_size_meters() -> f64 {
    DEFAULT_TAG_SIZE_METERS
}

fn default_tag_families() -> Vec<String> {
    vec![FamilyType::Family36H11.to_str().to_string()]
}

fn default_sources() -> Vec<SourceDescriptor> {
    vec![SourceDescriptor::Device(0)]
}

fn default_bridge_addr() -> String {
    DEFAULT_BRIDGE_ADDR.to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_record_fps() -> u32 {
    DEFAULT_RECORD_FPS
}

/// Tuning of the AprilTag detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorTuning {
    pub quad_decimate: f32,
    pub quad_sigma: f32,
    pub refine_edges: bool,
    pub decode_sharpening: f64,
}

impl Default for DetectorTuning {
    fn default() -> Self {
        let p = DetectorParams::default();
        Self {
            quad_decimate: p.quad_decimate,
            quad_sigma: p.quad_sigma,
            refine_edges: p.refine_edges,
            decode_sharpening: p.decode_sharpening,
        }
    }
}

impl From<&DetectorTuning> for DetectorParams {
    fn from(t: &DetectorTuning) -> Self {
        Self {
            quad_decimate: t.quad_decimate,
            quad_sigma: t.quad_sigma,
            refine_edges: t.refine_edges,
            decode_sharpening: t.decode_sharpening,
        }
    }
}

/// Where telemetry is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    /// UDP address of the bridge which writes the entries into the network
    /// table, `HOST:PORT`.
    #[serde(default = "default_bridge_addr")]
    pub bridge_addr: String,
    /// Name of the table the keys are written to.
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            bridge_addr: default_bridge_addr(),
            table: default_table(),
        }
    }
}

/// Optional outputs and interactive control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// If set, annotated frames are recorded to this `.y4m` file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_path: Option<PathBuf>,
    /// Frame rate written to the recording header.
    #[serde(default = "default_record_fps")]
    pub record_fps: u32,
    /// Stop the current source when Enter is pressed.
    #[serde(default)]
    pub stop_on_keypress: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            record_path: None,
            record_fps: DEFAULT_RECORD_FPS,
            stop_on_keypress: false,
        }
    }
}

/// The complete configuration, usually read from a `.toml` file.
///
/// Simple values come before tables so that the struct serializes to TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Physical edge length of the tags, in meters.
    #[serde(default = "default_tag_size_meters")]
    pub tag_size_meters: f64,
    /// Tag families to detect, e.g. `tag36h11`.
    #[serde(default = "default_tag_families")]
    pub tag_families: Vec<String>,
    #[serde(default)]
    pub selection: SelectionStrategy,
    #[serde(default)]
    pub miss_policy: MissPolicy,
    /// Input sources, processed in order. A number selects a camera device,
    /// anything else is a video file path. Can contain shell variables such
    /// as `~`.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub camera: CameraIntrinsics,
    #[serde(default)]
    pub detector: DetectorTuning,
    #[serde(default)]
    pub gate: QualityGate,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tag_size_meters: DEFAULT_TAG_SIZE_METERS,
            tag_families: default_tag_families(),
            selection: SelectionStrategy::default(),
            miss_policy: MissPolicy::default(),
            sources: default_sources(),
            camera: CameraIntrinsics::default(),
            detector: DetectorTuning::default(),
            gate: QualityGate::default(),
            publisher: PublisherConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

fn invalid(msg: String) -> Error {
    Error::Config(msg)
}

impl TelemetryConfig {
    /// Check all values, failing on the first invalid one.
    pub fn validate(&self) -> Result<()> {
        let c = &self.camera;
        for (name, v) in [("fx", c.fx), ("fy", c.fy)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(invalid(format!("camera {name} must be positive, got {v}")));
            }
        }
        for (name, v) in [("cx", c.cx), ("cy", c.cy)] {
            if !v.is_finite() {
                return Err(invalid(format!("camera {name} must be finite, got {v}")));
            }
        }
        if !(self.tag_size_meters.is_finite() && self.tag_size_meters > 0.0) {
            return Err(invalid(format!(
                "tag size must be positive, got {}",
                self.tag_size_meters
            )));
        }
        if self.gate.max_hamming < 0 {
            return Err(invalid(format!(
                "gate max_hamming must not be negative, got {}",
                self.gate.max_hamming
            )));
        }
        if !self.gate.min_decision_margin.is_finite() {
            return Err(invalid("gate min_decision_margin must be finite".into()));
        }
        let d = &self.detector;
        if !(d.quad_decimate.is_finite() && d.quad_decimate > 0.0) {
            return Err(invalid(format!(
                "detector quad_decimate must be positive, got {}",
                d.quad_decimate
            )));
        }
        if !(d.quad_sigma.is_finite() && d.decode_sharpening.is_finite() && d.decode_sharpening >= 0.0) {
            return Err(invalid(
                "detector quad_sigma and decode_sharpening must be finite, decode_sharpening not negative".into(),
            ));
        }
        self.families()?;
        if self.publisher.table.is_empty() {
            return Err(invalid("publisher table name is empty".into()));
        }
        if self.output.record_fps == 0 {
            return Err(invalid("output record_fps must be positive".into()));
        }
        Ok(())
    }

    /// The tag families, parsed.
    pub fn families(&self) -> Result<Vec<FamilyType>> {
        if self.tag_families.is_empty() {
            return Err(invalid("no tag families configured".into()));
        }
        self.tag_families
            .iter()
            .map(|name| {
                FamilyType::from_str_name(name).ok_or_else(|| {
                    let known: Vec<&str> = FamilyType::ALL.iter().map(|f| f.to_str()).collect();
                    invalid(format!(
                        "unknown tag family \"{name}\", expected one of {known:?}"
                    ))
                })
            })
            .collect()
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            camera: self.camera,
            tag_size_meters: self.tag_size_meters,
            gate: self.gate,
            selection: self.selection,
            miss_policy: self.miss_policy,
        }
    }

    /// Serialize to a `.toml` document.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Expand shell variables in paths and make relative paths relative to
    /// `dirname`.
    fn fixup_relative_paths(&mut self, dirname: &Path) -> Result<()> {
        for source in self.sources.iter_mut() {
            if let SourceDescriptor::File(path) = source {
                fixup_relative_path(path, dirname)?;
            }
        }
        if let Some(record_path) = self.output.record_path.as_mut() {
            fixup_relative_path(record_path, dirname)?;
        }
        Ok(())
    }
}

/// If `path` is relative, make it relative to `dirname`.
///
/// `path` can start with a tilde, which is expanded to the home directory.
fn fixup_relative_path(path: &mut PathBuf, dirname: &Path) -> Result<()> {
    let pathstr = path
        .to_str()
        .ok_or_else(|| invalid(format!("path {} is not valid UTF-8", path.display())))?;
    let expanded = shellexpand::full(pathstr)
        .map_err(|e| invalid(format!("in path \"{pathstr}\": {e}")))?;
    *path = PathBuf::from(expanded.to_string());

    if path.is_relative() {
        *path = dirname.join(&path);
    }
    Ok(())
}

/// Parse a `.toml` file and return a [TelemetryConfig] structure.
///
/// The result is not validated.
pub fn parse_config_file<P: AsRef<Path>>(fname: P) -> Result<TelemetryConfig> {
    let contents = std::fs::read_to_string(fname.as_ref())?;
    let mut cfg: TelemetryConfig = toml::from_str(&contents)?;
    let dirname = fname
        .as_ref()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    cfg.fixup_relative_paths(&dirname)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let cfg = TelemetryConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.families().unwrap(), vec![FamilyType::Family36H11]);
        assert_eq!(cfg.publisher.bridge_addr, "10.22.28.2:5800");
        assert_eq!(cfg.camera.fx, 622.27892);
    }

    #[test]
    fn default_roundtrips_through_toml() {
        let cfg = TelemetryConfig::default();
        let buf = cfg.to_toml().unwrap();
        let parsed: TelemetryConfig = toml::from_str(&buf).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: TelemetryConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, TelemetryConfig::default());
    }

    #[test]
    fn parse_partial() {
        let buf = r#"
            tag_size_meters = 0.2
            tag_families = ["tag36h11", "tagStandard41h12"]
            selection = "best-decision-margin"
            miss_policy = "absent"
            sources = ["1", "movies/a.mp4"]

            [camera]
            fx = 734.626748
            fy = 726.761294
            cx = 411.819409
            cy = 263.823832

            [gate]
            min_decision_margin = 40.0
        "#;
        let cfg: TelemetryConfig = toml::from_str(buf).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.tag_size_meters, 0.2);
        assert_eq!(cfg.selection, SelectionStrategy::BestDecisionMargin);
        assert_eq!(cfg.miss_policy, MissPolicy::Absent);
        assert_eq!(
            cfg.sources,
            vec![
                SourceDescriptor::Device(1),
                SourceDescriptor::File("movies/a.mp4".into())
            ]
        );
        assert_eq!(cfg.gate.max_hamming, 0);
        assert_eq!(cfg.gate.min_decision_margin, 40.0);
        assert_eq!(cfg.families().unwrap().len(), 2);
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(toml::from_str::<TelemetryConfig>("tag_size = 0.1").is_err());
    }

    #[test]
    fn invalid_values() {
        let mut cfg = TelemetryConfig::default();
        cfg.camera.fx = 0.0;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        let mut cfg = TelemetryConfig::default();
        cfg.camera.cy = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = TelemetryConfig::default();
        cfg.tag_size_meters = -0.1;
        assert!(cfg.validate().is_err());

        let mut cfg = TelemetryConfig::default();
        cfg.gate.max_hamming = -1;
        assert!(cfg.validate().is_err());

        let mut cfg = TelemetryConfig::default();
        cfg.tag_families = vec!["tag99h99".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = TelemetryConfig::default();
        cfg.tag_families.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn relative_paths_follow_config_file() -> Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let cfg_path = tmpdir.path().join("telemetry.toml");
        std::fs::write(
            &cfg_path,
            "sources = [\"0\", \"a.mp4\", \"/abs/b.mp4\"]\n[output]\nrecord_path = \"out.y4m\"\n",
        )?;
        let cfg = parse_config_file(&cfg_path)?;
        assert_eq!(
            cfg.sources,
            vec![
                SourceDescriptor::Device(0),
                SourceDescriptor::File(tmpdir.path().join("a.mp4")),
                SourceDescriptor::File("/abs/b.mp4".into()),
            ]
        );
        assert_eq!(cfg.output.record_path, Some(tmpdir.path().join("out.y4m")));
        Ok(())
    }
}
