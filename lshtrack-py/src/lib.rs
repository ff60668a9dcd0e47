//! Python bindings for the lshtrack descriptor matcher and pose tracker.
//!
//! Descriptors cross the boundary as `(rows, 32)` uint8 numpy arrays.

use numpy::{PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use lshtrack::{
    aggregate_stats, GyroSample, LshConfig as RustLshConfig, LshIndex as RustLshIndex,
    LshTrackError, Match as RustMatch, MatchConfig as RustMatchConfig,
    MatchStats as RustMatchStats, Matcher as RustMatcher, Point2, Quad,
    TemporalTracker as RustTemporalTracker, TrackerConfig as RustTrackerConfig,
    TrackerOutput as RustTrackerOutput, DESCRIPTOR_BYTES,
};

/// Convert an LshTrackError to a Python exception.
fn to_py_err(err: LshTrackError) -> PyErr {
    match err {
        LshTrackError::InvalidInput(_) | LshTrackError::DescriptorLength { .. } => {
            PyValueError::new_err(err.to_string())
        }
        LshTrackError::IndexOutOfBounds { .. } => PyRuntimeError::new_err(err.to_string()),
    }
}

/// Borrow a `(rows, 32)` uint8 array as flat descriptor bytes.
fn descriptor_rows<'a>(array: &'a PyReadonlyArray2<'_, u8>) -> PyResult<(&'a [u8], usize)> {
    let shape = array.shape();
    if shape[1] != DESCRIPTOR_BYTES {
        return Err(PyValueError::new_err(format!(
            "descriptors must have {DESCRIPTOR_BYTES} columns, got {}",
            shape[1]
        )));
    }
    Ok((array.as_slice()?, shape[0]))
}

/// Accepted descriptor correspondence.
#[pyclass]
#[derive(Clone)]
pub struct Match {
    /// Row in the reference corpus.
    #[pyo3(get)]
    pub query_idx: usize,
    /// Row in the live descriptor array.
    #[pyo3(get)]
    pub train_idx: usize,
    /// Hamming distance in bits.
    #[pyo3(get)]
    pub distance: u32,
}

#[pymethods]
impl Match {
    fn __repr__(&self) -> String {
        format!(
            "Match(query_idx={}, train_idx={}, distance={})",
            self.query_idx, self.train_idx, self.distance
        )
    }
}

impl From<RustMatch> for Match {
    fn from(m: RustMatch) -> Self {
        Self {
            query_idx: m.query_idx,
            train_idx: m.train_idx,
            distance: m.distance,
        }
    }
}

/// Distance summary over accepted matches.
#[pyclass]
#[derive(Clone)]
pub struct MatchStats {
    #[pyo3(get)]
    pub count: usize,
    #[pyo3(get)]
    pub mean_dist: f32,
    #[pyo3(get)]
    pub min_dist: u32,
    #[pyo3(get)]
    pub max_dist: u32,
    #[pyo3(get)]
    pub median_dist: f32,
}

#[pymethods]
impl MatchStats {
    fn __repr__(&self) -> String {
        format!(
            "MatchStats(count={}, mean_dist={:.2}, min_dist={}, max_dist={}, median_dist={:.1})",
            self.count, self.mean_dist, self.min_dist, self.max_dist, self.median_dist
        )
    }
}

impl From<RustMatchStats> for MatchStats {
    fn from(s: RustMatchStats) -> Self {
        Self {
            count: s.count,
            mean_dist: s.mean_dist,
            min_dist: s.min_dist,
            max_dist: s.max_dist,
            median_dist: s.median_dist,
        }
    }
}

/// Configuration for the ratio-test matcher.
#[pyclass]
#[derive(Clone)]
pub struct MatchConfig {
    inner: RustMatchConfig,
}

#[pymethods]
impl MatchConfig {
    /// Create a new MatchConfig.
    ///
    /// Args:
    ///     max_candidates: Candidate cap per query (default: 600)
    ///     ratio: Ratio-test threshold (default: 0.75)
    ///     max_hamming: Absolute distance cap; derived from the corpus if None
    ///     use_multi_probe: Probe neighboring buckets (default: True)
    ///     parallel: Match queries on the rayon pool (default: False)
    #[new]
    #[pyo3(signature = (
        max_candidates = 600,
        ratio = 0.75,
        max_hamming = None,
        use_multi_probe = true,
        parallel = false
    ))]
    fn new(
        max_candidates: usize,
        ratio: f32,
        max_hamming: Option<u32>,
        use_multi_probe: bool,
        parallel: bool,
    ) -> PyResult<Self> {
        let inner = RustMatchConfig {
            max_candidates,
            ratio,
            max_hamming,
            use_multi_probe,
            parallel,
            ..RustMatchConfig::default()
        };
        inner.validate().map_err(to_py_err)?;
        Ok(Self { inner })
    }

    fn __repr__(&self) -> String {
        format!(
            "MatchConfig(max_candidates={}, ratio={}, max_hamming={:?}, use_multi_probe={}, parallel={})",
            self.inner.max_candidates,
            self.inner.ratio,
            self.inner.max_hamming,
            self.inner.use_multi_probe,
            self.inner.parallel
        )
    }
}

/// Multi-table LSH index over a reference descriptor corpus.
#[pyclass]
pub struct LshIndex {
    inner: RustLshIndex,
}

#[pymethods]
impl LshIndex {
    /// Build an index from a `(rows, 32)` uint8 array.
    ///
    /// Args:
    ///     descriptors: reference descriptors
    ///     num_tables: Number of hash tables (default: 10)
    ///     key_bits: Sampled bits per table key (default: 18)
    ///     seed_base: Seed of the first table (default: 1337)
    #[new]
    #[pyo3(signature = (descriptors, num_tables = 10, key_bits = 18, seed_base = 1337))]
    fn new(
        descriptors: PyReadonlyArray2<'_, u8>,
        num_tables: usize,
        key_bits: usize,
        seed_base: u32,
    ) -> PyResult<Self> {
        let (data, rows) = descriptor_rows(&descriptors)?;
        let cfg = RustLshConfig {
            num_tables,
            key_bits,
            seed_base,
        };
        let inner = RustLshIndex::build(data, rows, cfg).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Number of reference rows.
    #[getter]
    fn rows(&self) -> usize {
        self.inner.ref_rows()
    }

    /// Sampled `(mean, std)` pairwise distance of the corpus.
    #[getter]
    fn distance_stats(&self) -> (f32, f32) {
        let stats = self.inner.stats();
        (stats.mean_dist, stats.std_dist)
    }

    /// Create a matcher over a copy of this index.
    #[pyo3(signature = (config = None))]
    fn matcher(&self, config: Option<MatchConfig>) -> Matcher {
        let cfg = config.map(|c| c.inner).unwrap_or_default();
        Matcher {
            inner: RustMatcher::new(self.inner.clone()).with_config(cfg),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "LshIndex(rows={}, tables={})",
            self.inner.ref_rows(),
            self.inner.tables().len()
        )
    }
}

/// Ratio-test matcher bound to one index.
#[pyclass]
pub struct Matcher {
    inner: RustMatcher,
}

#[pymethods]
impl Matcher {
    /// Match live descriptors against the reference corpus.
    ///
    /// Returns:
    ///     List with one entry per live row: Match or None
    fn match_batch(&self, live: PyReadonlyArray2<'_, u8>) -> PyResult<Vec<Option<Match>>> {
        let (data, rows) = descriptor_rows(&live)?;
        let matches = self.inner.match_batch(data, rows).map_err(to_py_err)?;
        Ok(matches.into_iter().map(|m| m.map(Match::from)).collect())
    }

    /// Match live descriptors and summarize the accepted distances.
    ///
    /// Returns:
    ///     Tuple of (list of Match or None, MatchStats)
    fn match_with_stats(
        &self,
        live: PyReadonlyArray2<'_, u8>,
    ) -> PyResult<(Vec<Option<Match>>, MatchStats)> {
        let (data, rows) = descriptor_rows(&live)?;
        let matches = self.inner.match_batch(data, rows).map_err(to_py_err)?;
        let stats = aggregate_stats(&matches).into();
        Ok((
            matches.into_iter().map(|m| m.map(Match::from)).collect(),
            stats,
        ))
    }

    /// Distance threshold in effect for this corpus.
    #[getter]
    fn max_hamming(&self) -> u32 {
        self.inner.config().resolve_max_hamming(self.inner.index())
    }

    fn __repr__(&self) -> String {
        format!("Matcher(rows={})", self.inner.index().ref_rows())
    }
}

/// One tracker step.
#[pyclass]
#[derive(Clone)]
pub struct TrackerOutput {
    /// Four `(x, y)` corners TL, TR, BR, BL, or None.
    #[pyo3(get)]
    pub corners: Option<Vec<(f32, f32)>>,
    #[pyo3(get)]
    pub confidence: f32,
    /// One of "initial", "tracking", "predicted", "lost".
    #[pyo3(get)]
    pub mode: String,
}

#[pymethods]
impl TrackerOutput {
    fn __repr__(&self) -> String {
        format!(
            "TrackerOutput(mode='{}', confidence={:.2}, corners={:?})",
            self.mode, self.confidence, self.corners
        )
    }
}

impl From<RustTrackerOutput> for TrackerOutput {
    fn from(out: RustTrackerOutput) -> Self {
        Self {
            corners: out
                .corners
                .map(|quad| quad.iter().map(|p| (p.x, p.y)).collect()),
            confidence: out.confidence,
            mode: out.mode.as_str().to_string(),
        }
    }
}

fn to_quad(corners: &[(f32, f32)]) -> PyResult<Quad> {
    let [a, b, c, d] = corners else {
        return Err(PyValueError::new_err("corners must contain exactly 4 points"));
    };
    Ok([a, b, c, d].map(|&(x, y)| Point2::new(x, y)))
}

/// Kalman-smoothed quadrilateral tracker.
#[pyclass]
pub struct TemporalTracker {
    inner: RustTemporalTracker,
}

#[pymethods]
impl TemporalTracker {
    /// Create a tracker.
    ///
    /// Args:
    ///     min_matches_for_update: Weaker detections count as missing (default: 8)
    ///     max_frames_without_detection: Prediction budget (default: 12)
    ///     use_gyro: Fuse gyro rotation (default: True)
    ///     max_scale_change: Relative scale change per update (default: 0.15)
    ///     frame_dt: Interval for untimed updates in seconds (default: 1/30)
    #[new]
    #[pyo3(signature = (
        min_matches_for_update = 8,
        max_frames_without_detection = 12,
        use_gyro = true,
        max_scale_change = 0.15,
        frame_dt = 1.0 / 30.0
    ))]
    fn new(
        min_matches_for_update: usize,
        max_frames_without_detection: usize,
        use_gyro: bool,
        max_scale_change: f32,
        frame_dt: f32,
    ) -> PyResult<Self> {
        let cfg = RustTrackerConfig {
            min_matches_for_update,
            max_frames_without_detection,
            use_gyro,
            max_scale_change,
            frame_dt,
            ..RustTrackerConfig::default()
        };
        let inner = RustTemporalTracker::try_with_config(cfg).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Advance one frame.
    ///
    /// Args:
    ///     corners: Four `(x, y)` points or None when nothing was detected
    ///     match_count: Matches supporting the detection
    ///     gyro: Optional `(x, y, z, timestamp_s)` angular-rate sample
    ///     timestamp: Frame time in seconds; frame_dt steps are used if None
    #[pyo3(signature = (corners, match_count, gyro = None, timestamp = None))]
    fn update(
        &mut self,
        corners: Option<Vec<(f32, f32)>>,
        match_count: usize,
        gyro: Option<(f32, f32, f32, f64)>,
        timestamp: Option<f64>,
    ) -> PyResult<TrackerOutput> {
        let quad = corners.as_deref().map(to_quad).transpose()?;
        let gyro = gyro.map(|(x, y, z, t)| GyroSample::new(x, y, z, t));
        let out = match timestamp {
            Some(t) => self.inner.update_at(t, quad.as_ref(), match_count, gyro),
            None => self.inner.update(quad.as_ref(), match_count, gyro),
        };
        Ok(out.into())
    }

    /// Drop all tracking state.
    fn reset(&mut self) {
        self.inner.reset();
    }

    #[getter]
    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    #[getter]
    fn frames_without_detection(&self) -> usize {
        self.inner.frames_without_detection()
    }

    fn __repr__(&self) -> String {
        format!(
            "TemporalTracker(initialized={}, frames_without_detection={})",
            self.inner.is_initialized(),
            self.inner.frames_without_detection()
        )
    }
}

/// Python module for lshtrack.
#[pymodule]
fn _lshtrack(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Match>()?;
    m.add_class::<MatchStats>()?;
    m.add_class::<MatchConfig>()?;
    m.add_class::<LshIndex>()?;
    m.add_class::<Matcher>()?;
    m.add_class::<TrackerOutput>()?;
    m.add_class::<TemporalTracker>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
