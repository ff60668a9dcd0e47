use clap::Parser;
use lshtrack::lowlevel::FilterNoise;
use lshtrack::{
    aggregate_stats, GyroSample, LshConfig, LshIndex, Match, MatchConfig, MatchStats, Matcher,
    Point2, Quad, TemporalTracker, TrackerConfig, TrackerOutput, DESCRIPTOR_BYTES,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "LshTrack CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct IndexConfigJson {
    num_tables: usize,
    key_bits: usize,
    seed_base: u32,
}

impl Default for IndexConfigJson {
    fn default() -> Self {
        let cfg = LshConfig::default();
        Self {
            num_tables: cfg.num_tables,
            key_bits: cfg.key_bits,
            seed_base: cfg.seed_base,
        }
    }
}

impl From<IndexConfigJson> for LshConfig {
    fn from(value: IndexConfigJson) -> Self {
        Self {
            num_tables: value.num_tables,
            key_bits: value.key_bits,
            seed_base: value.seed_base,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MatchConfigJson {
    max_candidates: usize,
    ratio: f32,
    max_hamming: Option<u32>,
    use_multi_probe: bool,
    multi_probe_flip_bits: usize,
    multi_probe_max_key_bits: usize,
    parallel: bool,
}

impl Default for MatchConfigJson {
    fn default() -> Self {
        let cfg = MatchConfig::default();
        Self {
            max_candidates: cfg.max_candidates,
            ratio: cfg.ratio,
            max_hamming: cfg.max_hamming,
            use_multi_probe: cfg.use_multi_probe,
            multi_probe_flip_bits: cfg.multi_probe_flip_bits,
            multi_probe_max_key_bits: cfg.multi_probe_max_key_bits,
            parallel: cfg.parallel,
        }
    }
}

impl From<MatchConfigJson> for MatchConfig {
    fn from(value: MatchConfigJson) -> Self {
        Self {
            max_candidates: value.max_candidates,
            ratio: value.ratio,
            max_hamming: value.max_hamming,
            use_multi_probe: value.use_multi_probe,
            multi_probe_flip_bits: value.multi_probe_flip_bits,
            multi_probe_max_key_bits: value.multi_probe_max_key_bits,
            parallel: value.parallel,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct NoiseJson {
    process: f32,
    measurement: f32,
}

impl From<FilterNoise> for NoiseJson {
    fn from(value: FilterNoise) -> Self {
        Self {
            process: value.process,
            measurement: value.measurement,
        }
    }
}

impl From<NoiseJson> for FilterNoise {
    fn from(value: NoiseJson) -> Self {
        FilterNoise::new(value.process, value.measurement)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TrackerConfigJson {
    min_matches_for_update: usize,
    max_frames_without_detection: usize,
    use_gyro: bool,
    gyro_weight: f32,
    center_noise: NoiseJson,
    rotation_noise: NoiseJson,
    scale_noise: NoiseJson,
    max_scale_change: f32,
    frame_dt: f32,
    max_gyro_dt: f64,
}

impl Default for TrackerConfigJson {
    fn default() -> Self {
        let cfg = TrackerConfig::default();
        Self {
            min_matches_for_update: cfg.min_matches_for_update,
            max_frames_without_detection: cfg.max_frames_without_detection,
            use_gyro: cfg.use_gyro,
            gyro_weight: cfg.gyro_weight,
            center_noise: cfg.center_noise.into(),
            rotation_noise: cfg.rotation_noise.into(),
            scale_noise: cfg.scale_noise.into(),
            max_scale_change: cfg.max_scale_change,
            frame_dt: cfg.frame_dt,
            max_gyro_dt: cfg.max_gyro_dt,
        }
    }
}

impl From<TrackerConfigJson> for TrackerConfig {
    fn from(value: TrackerConfigJson) -> Self {
        Self {
            min_matches_for_update: value.min_matches_for_update,
            max_frames_without_detection: value.max_frames_without_detection,
            use_gyro: value.use_gyro,
            gyro_weight: value.gyro_weight,
            center_noise: value.center_noise.into(),
            rotation_noise: value.rotation_noise.into(),
            scale_noise: value.scale_noise.into(),
            max_scale_change: value.max_scale_change,
            frame_dt: value.frame_dt,
            max_gyro_dt: value.max_gyro_dt,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    reference_path: String,
    live_path: Option<String>,
    frames_path: Option<String>,
    output_path: Option<String>,
    index: IndexConfigJson,
    #[serde(rename = "match")]
    match_cfg: MatchConfigJson,
    tracker: TrackerConfigJson,
}

#[derive(Debug, Deserialize)]
struct GyroJson {
    x: f32,
    y: f32,
    z: f32,
    t: f64,
}

/// One recorded frame for tracker replay.
#[derive(Debug, Deserialize)]
struct FrameJson {
    #[serde(default)]
    t: Option<f64>,
    #[serde(default)]
    corners: Option<[[f32; 2]; 4]>,
    #[serde(default)]
    match_count: usize,
    #[serde(default)]
    gyro: Option<GyroJson>,
}

#[derive(Debug, Serialize)]
struct TableRecord {
    buckets: usize,
    max_bucket: usize,
    mean_bucket: f32,
}

#[derive(Debug, Serialize)]
struct IndexRecord {
    rows: usize,
    mean_dist: f32,
    std_dist: f32,
    tables: Vec<TableRecord>,
}

#[derive(Debug, Serialize)]
struct MatchRecord {
    query_idx: usize,
    train_idx: usize,
    distance: u32,
}

impl From<Match> for MatchRecord {
    fn from(value: Match) -> Self {
        Self {
            query_idx: value.query_idx,
            train_idx: value.train_idx,
            distance: value.distance,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsRecord {
    count: usize,
    mean_dist: f32,
    min_dist: u32,
    max_dist: u32,
    median_dist: f32,
}

impl From<MatchStats> for StatsRecord {
    fn from(value: MatchStats) -> Self {
        Self {
            count: value.count,
            mean_dist: value.mean_dist,
            min_dist: value.min_dist,
            max_dist: value.max_dist,
            median_dist: value.median_dist,
        }
    }
}

#[derive(Debug, Serialize)]
struct TrackRecord {
    frame: usize,
    mode: &'static str,
    confidence: f32,
    corners: Option<[[f32; 2]; 4]>,
}

impl TrackRecord {
    fn new(frame: usize, out: TrackerOutput) -> Self {
        Self {
            frame,
            mode: out.mode.as_str(),
            confidence: out.confidence,
            corners: out.corners.map(|quad| quad.map(|p| [p.x, p.y])),
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    index: IndexRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    matches: Option<Vec<Option<MatchRecord>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<StatsRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    track: Option<Vec<TrackRecord>>,
}

fn read_descriptors(path: &str) -> Result<(Vec<u8>, usize), Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    // A trailing partial row is reported by the library as a length mismatch.
    let rows = bytes.len() / DESCRIPTOR_BYTES;
    Ok((bytes, rows))
}

fn replay_frames(
    frames: &[FrameJson],
    cfg: TrackerConfig,
) -> Result<Vec<TrackRecord>, Box<dyn std::error::Error>> {
    let mut tracker = TemporalTracker::try_with_config(cfg)?;
    let mut records = Vec::with_capacity(frames.len());
    for (idx, frame) in frames.iter().enumerate() {
        let quad: Option<Quad> = frame.corners.map(|raw| raw.map(|[x, y]| Point2::new(x, y)));
        let gyro = frame
            .gyro
            .as_ref()
            .map(|g| GyroSample::new(g.x, g.y, g.z, g.t));
        let out = match frame.t {
            Some(t) => tracker.update_at(t, quad.as_ref(), frame.match_count, gyro),
            None => tracker.update(quad.as_ref(), frame.match_count, gyro),
        };
        records.push(TrackRecord::new(idx, out));
    }
    Ok(records)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("lshtrack=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.reference_path.is_empty() {
        return Err("reference_path must be set in the config".into());
    }

    let (corpus, rows) = read_descriptors(&config.reference_path)?;
    let index = LshIndex::build(&corpus, rows, config.index.into())?;
    let index_record = IndexRecord {
        rows: index.ref_rows(),
        mean_dist: index.stats().mean_dist,
        std_dist: index.stats().std_dist,
        tables: index
            .table_stats()
            .into_iter()
            .map(|t| TableRecord {
                buckets: t.buckets,
                max_bucket: t.max_bucket,
                mean_bucket: t.mean_bucket,
            })
            .collect(),
    };

    let matcher = Matcher::new(index).with_config(config.match_cfg.into());
    let (matches, stats) = match config.live_path.as_deref() {
        Some(path) => {
            let (live, live_rows) = read_descriptors(path)?;
            let matches = matcher.match_batch(&live, live_rows)?;
            let stats = aggregate_stats(&matches);
            let records = matches
                .into_iter()
                .map(|m| m.map(MatchRecord::from))
                .collect();
            (Some(records), Some(StatsRecord::from(stats)))
        }
        None => (None, None),
    };

    let track = match config.frames_path.as_deref() {
        Some(path) => {
            let frames: Vec<FrameJson> = serde_json::from_str(&fs::read_to_string(path)?)?;
            Some(replay_frames(&frames, config.tracker.into())?)
        }
        None => None,
    };

    let output = Output {
        index: index_record,
        matches,
        stats,
        track,
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{replay_frames, Config, FrameJson, EXAMPLE_JSON};
    use lshtrack::TrackerConfig;

    #[test]
    fn example_config_parses() {
        let config: Config = serde_json::from_str(EXAMPLE_JSON).unwrap();
        assert_eq!(config.reference_path, "reference.bin");
        assert_eq!(config.index.key_bits, 18);
        assert_eq!(config.match_cfg.max_hamming, None);
        assert_eq!(config.tracker.max_frames_without_detection, 12);
        assert_eq!(config.tracker.max_gyro_dt, 0.2);
    }

    #[test]
    fn max_gyro_dt_reaches_tracker_config() {
        let config: Config = serde_json::from_str(
            r#"{ "reference_path": "r.bin", "tracker": { "max_gyro_dt": 0.05 } }"#,
        )
        .unwrap();
        let tracker_cfg = TrackerConfig::from(config.tracker);
        assert_eq!(tracker_cfg.max_gyro_dt, 0.05);
        assert_eq!(tracker_cfg.frame_dt, TrackerConfig::default().frame_dt);
    }

    #[test]
    fn missing_sections_use_library_defaults() {
        let config: Config = serde_json::from_str(r#"{ "reference_path": "r.bin" }"#).unwrap();
        assert_eq!(config.index.num_tables, 10);
        assert_eq!(config.match_cfg.max_candidates, 600);
        assert!(config.match_cfg.use_multi_probe);
        assert_eq!(config.tracker.min_matches_for_update, 8);
    }

    #[test]
    fn replay_reports_modes() {
        let frames: Vec<FrameJson> = serde_json::from_str(
            r#"[
                { "corners": [[0, 0], [10, 0], [10, 10], [0, 10]], "match_count": 30 },
                { "corners": [[1, 0], [11, 0], [11, 10], [1, 10]], "match_count": 30 },
                { "match_count": 0, "gyro": { "x": 0, "y": 0, "z": 0.2, "t": 0.1 } }
            ]"#,
        )
        .unwrap();
        let records = replay_frames(&frames, TrackerConfig::default()).unwrap();
        let modes: Vec<_> = records.iter().map(|r| r.mode).collect();
        assert_eq!(modes, ["initial", "tracking", "predicted"]);
        assert!(records[2].corners.is_some());

        let json = serde_json::to_value(&records).unwrap();
        assert_eq!(json[0]["mode"], "initial");
    }
}
