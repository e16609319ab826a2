//! Tables - named 1-D sample buffers for wavetable lookup, recording
//! and morphing. Tables live outside the stream graph but share its
//! block clock: readers observe whatever the last writer in evaluation
//! order left for that block.

use crate::error::TableError;
use core::f32::consts::TAU;
use hashbrown::HashMap;

/// Unique identifier for a table within a server.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TableId(pub(crate) u32);

/// How fractional-index reads outside the buffer are handled.
///
/// Never a silent no-op: out-of-range indices are folded back in by the
/// declared mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AddressMode {
    /// Fold the index to the nearest end.
    Clamp,
    /// Fold the index modulo the table length (loop addressing).
    Wrap,
}

/// Interpolation shape for fractional-index reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Interp {
    /// Truncating lookup
    None,
    /// Two-point linear
    Linear,
    /// Four-point cubic (Catmull-Rom)
    Cubic,
    /// Two-point crossfade with a table-driven weight curve
    Lookup,
}

/// A reusable interpolated reader.
///
/// For [`Interp::Lookup`] the crossfade weights come from a precomputed
/// raised-cosine curve table, built once at construction so the read path
/// stays free of transcendentals.
#[derive(Clone, Debug)]
pub struct Interpolator {
    kind: Interp,
    curve: Vec<f32>,
}

const LOOKUP_CURVE_LEN: usize = 512;

impl Interpolator {
    pub fn new(kind: Interp) -> Self {
        let curve = match kind {
            Interp::Lookup => (0..LOOKUP_CURVE_LEN)
                .map(|i| {
                    let t = i as f32 / (LOOKUP_CURVE_LEN - 1) as f32;
                    0.5 - 0.5 * (t * core::f32::consts::PI).cos()
                })
                .collect(),
            _ => Vec::new(),
        };
        Self { kind, curve }
    }

    pub fn kind(&self) -> Interp {
        self.kind
    }

    /// Read `samples` at fractional position `pos`.
    pub fn read(&self, samples: &[f32], pos: f32, mode: AddressMode) -> f32 {
        let n = samples.len();
        if n == 0 {
            return 0.0;
        }
        let at = |i: i64| -> f32 {
            let idx = match mode {
                AddressMode::Clamp => i.clamp(0, n as i64 - 1),
                AddressMode::Wrap => i.rem_euclid(n as i64),
            };
            samples[idx as usize]
        };
        let base = pos.floor();
        let frac = pos - base;
        let i = base as i64;
        match self.kind {
            Interp::None => at(i),
            Interp::Linear => {
                let a = at(i);
                let b = at(i + 1);
                a + (b - a) * frac
            }
            Interp::Cubic => {
                let y0 = at(i - 1);
                let y1 = at(i);
                let y2 = at(i + 1);
                let y3 = at(i + 2);
                y1 + 0.5
                    * frac
                    * (y2 - y0
                        + frac
                            * (2.0 * y0 - 5.0 * y1 + 4.0 * y2 - y3
                                + frac * (3.0 * (y1 - y2) + y3 - y0)))
            }
            Interp::Lookup => {
                let a = at(i);
                let b = at(i + 1);
                let w = self.curve[(frac * (LOOKUP_CURVE_LEN - 1) as f32) as usize];
                a + (b - a) * w
            }
        }
    }
}

/// Whole-buffer curve reconstruction from anchor points.
///
/// The exact reshape formula is a strategy, not a fixed algorithm: the
/// shipped [`HermiteCurve`] uses the classic Hermite formulation where
/// `tension` scales the tangents and `bias` skews them toward the earlier
/// or later segment. Callers with different taste supply their own.
pub trait CurveStrategy {
    /// Render the curve through `anchors` (fractional index, value) into
    /// `out`, filling the span between the first and last anchor.
    fn render(&self, anchors: &[(f32, f32)], tension: f32, bias: f32, out: &mut [f32]);
}

/// Hermite-basis curve rendering with tension/bias tangent control.
pub struct HermiteCurve;

impl CurveStrategy for HermiteCurve {
    fn render(&self, anchors: &[(f32, f32)], tension: f32, bias: f32, out: &mut [f32]) {
        if anchors.len() < 2 || out.is_empty() {
            return;
        }
        let y = |k: i64| -> f32 {
            let k = k.clamp(0, anchors.len() as i64 - 1) as usize;
            anchors[k].1
        };
        for seg in 0..anchors.len() - 1 {
            let (x0, y1) = anchors[seg];
            let (x1, y2) = anchors[seg + 1];
            let y0 = y(seg as i64 - 1);
            let y3 = y(seg as i64 + 2);
            let span = x1 - x0;
            if span <= 0.0 {
                continue;
            }
            let c0 = (1.0 + bias) * (1.0 - tension) * 0.5;
            let c1 = (1.0 - bias) * (1.0 - tension) * 0.5;
            let m0 = c0 * (y1 - y0) + c1 * (y2 - y1);
            let m1 = c0 * (y2 - y1) + c1 * (y3 - y2);
            let lo = x0.ceil().max(0.0) as usize;
            let hi = (x1.floor() as usize).min(out.len().saturating_sub(1));
            for i in lo..=hi {
                let t = (i as f32 - x0) / span;
                let t2 = t * t;
                let t3 = t2 * t;
                let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
                let h10 = t3 - 2.0 * t2 + t;
                let h01 = -2.0 * t3 + 3.0 * t2;
                let h11 = t3 - t2;
                out[i] = h00 * y1 + h10 * m0 + h01 * m1 + h11 * y2;
            }
        }
    }
}

/// A named 1-D sample buffer with explicit length and channel count.
///
/// Mutable in place. Every mutation bumps a version counter; morph
/// writers and caching readers compare versions instead of contents.
#[derive(Clone, Debug)]
pub struct Table {
    data: Vec<Vec<f32>>,
    sample_rate: f32,
    version: u64,
}

impl Table {
    /// A silent table of `frames` frames and `chnls` channels.
    pub fn new(frames: usize, chnls: usize, sample_rate: f32) -> Result<Self, TableError> {
        if frames == 0 {
            return Err(TableError::ZeroLength);
        }
        if chnls == 0 {
            return Err(TableError::ZeroChannels);
        }
        Ok(Self {
            data: vec![vec![0.0; frames]; chnls],
            sample_rate,
            version: 0,
        })
    }

    /// A table sized to `secs` seconds at `sample_rate`.
    pub fn with_duration(secs: f32, chnls: usize, sample_rate: f32) -> Result<Self, TableError> {
        Self::new((secs * sample_rate) as usize, chnls, sample_rate)
    }

    /// Build from per-channel frame data.
    pub fn from_frames(data: Vec<Vec<f32>>, sample_rate: f32) -> Result<Self, TableError> {
        if data.is_empty() {
            return Err(TableError::ZeroChannels);
        }
        if data.iter().any(|c| c.is_empty()) {
            return Err(TableError::ZeroLength);
        }
        Ok(Self {
            data,
            sample_rate,
            version: 0,
        })
    }

    /// Build from interleaved samples.
    pub fn from_interleaved(
        samples: &[f32],
        chnls: usize,
        sample_rate: f32,
    ) -> Result<Self, TableError> {
        if chnls == 0 {
            return Err(TableError::ZeroChannels);
        }
        let frames = samples.len() / chnls;
        if frames == 0 {
            return Err(TableError::ZeroLength);
        }
        let mut data = vec![Vec::with_capacity(frames); chnls];
        for frame in samples.chunks_exact(chnls) {
            for (c, &s) in frame.iter().enumerate() {
                data[c].push(s);
            }
        }
        Ok(Self {
            data,
            sample_rate,
            version: 0,
        })
    }

    /// One cycle of a unit sine wave.
    pub fn sine(frames: usize, sample_rate: f32) -> Result<Self, TableError> {
        Self::harmonics(frames, &[1.0], sample_rate)
    }

    /// One cycle of a harmonic series with the given relative amplitudes.
    pub fn harmonics(frames: usize, amps: &[f32], sample_rate: f32) -> Result<Self, TableError> {
        let mut t = Self::new(frames, 1, sample_rate)?;
        for (i, s) in t.data[0].iter_mut().enumerate() {
            let phase = i as f32 / frames as f32;
            *s = amps
                .iter()
                .enumerate()
                .map(|(h, &a)| a * (TAU * phase * (h + 1) as f32).sin())
                .sum();
        }
        t.version += 1;
        Ok(t)
    }

    /// Frames per channel.
    #[inline]
    pub fn len(&self) -> usize {
        self.data[0].len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn chnls(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f32 {
        self.len() as f32 / self.sample_rate
    }

    /// Mutation counter. Bumped by every write, transform or resize.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn channel(&self, c: usize) -> &[f32] {
        &self.data[c % self.data.len()]
    }

    /// Mutable channel access. Counts as a mutation.
    pub fn channel_mut(&mut self, c: usize) -> &mut [f32] {
        self.version += 1;
        let n = self.data.len();
        &mut self.data[c % n]
    }

    #[inline]
    pub fn sample(&self, c: usize, idx: usize) -> f32 {
        let ch = self.channel(c);
        ch[idx % ch.len()]
    }

    pub fn set_sample(&mut self, c: usize, idx: usize, v: f32) {
        self.version += 1;
        let n = self.data.len();
        let ch = &mut self.data[c % n];
        let len = ch.len();
        ch[idx % len] = v;
    }

    /// Interpolated read at fractional frame `pos`.
    pub fn read(&self, c: usize, pos: f32, interp: &Interpolator, mode: AddressMode) -> f32 {
        interp.read(self.channel(c), pos, mode)
    }

    /// Resize to `frames`, truncating or zero-padding. Counts as a
    /// mutation.
    pub fn resize(&mut self, frames: usize) -> Result<(), TableError> {
        if frames == 0 {
            return Err(TableError::ZeroLength);
        }
        for ch in self.data.iter_mut() {
            ch.resize(frames, 0.0);
        }
        self.version += 1;
        Ok(())
    }

    /// Rescale all channels so the peak absolute sample is 1.0.
    ///
    /// A silent table is left untouched. Explicitly re-triggered by the
    /// caller after edits; reads never renormalize on their own.
    pub fn normalize(&mut self) {
        let peak = self
            .data
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |m, &s| m.max(s.abs()));
        if peak > 0.0 {
            let g = 1.0 / peak;
            for ch in self.data.iter_mut() {
                for s in ch.iter_mut() {
                    *s *= g;
                }
            }
        }
        self.version += 1;
    }

    /// Rebuild channel `c` from curve anchors with the default Hermite
    /// strategy.
    pub fn reshape(
        &mut self,
        c: usize,
        anchors: &[(f32, f32)],
        tension: f32,
        bias: f32,
    ) -> Result<(), TableError> {
        self.reshape_with(c, anchors, tension, bias, &HermiteCurve)
    }

    /// Rebuild channel `c` from curve anchors with a caller-supplied
    /// strategy.
    pub fn reshape_with(
        &mut self,
        c: usize,
        anchors: &[(f32, f32)],
        tension: f32,
        bias: f32,
        strategy: &dyn CurveStrategy,
    ) -> Result<(), TableError> {
        if anchors.len() < 2 {
            return Err(TableError::TooFewAnchors);
        }
        let n = self.data.len();
        strategy.render(anchors, tension, bias, &mut self.data[c % n]);
        self.version += 1;
        Ok(())
    }
}

/// The arena of tables owned by a server.
#[derive(Default)]
pub struct TableStore {
    tables: HashMap<TableId, Table>,
    next: u32,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: Table) -> TableId {
        let id = TableId(self.next);
        self.next += 1;
        self.tables.insert(id, table);
        id
    }

    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    pub fn get_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(&id)
    }

    pub fn remove(&mut self, id: TableId) -> Option<Table> {
        self.tables.remove(&id)
    }

    /// Replace a table's contents wholesale, returning the old table.
    /// Readers pick up the new data at their next block.
    pub fn replace(&mut self, id: TableId, table: Table) -> Option<Table> {
        self.tables.insert(id, table)
    }

    /// Recompute `dest` as the weighted blend of `sources` at `pos`.
    ///
    /// `pos` is clamped to `[0, len-1]`; the two bracketing sources blend
    /// linearly, so integral positions read identically to one source and
    /// the midpoint is the sample-wise mean of its neighbors.
    pub fn morph_into(
        &mut self,
        dest: TableId,
        sources: &[TableId],
        pos: f32,
    ) -> Result<(), TableError> {
        if sources.len() < 2 {
            return Err(TableError::TooFewSources);
        }
        if sources.contains(&dest) {
            return Err(TableError::SelfSource);
        }
        // Take the destination out of the arena so sources stay readable.
        let mut d = match self.tables.remove(&dest) {
            Some(d) => d,
            None => return Err(TableError::ZeroLength),
        };
        let result = self.blend(&mut d, sources, pos);
        self.tables.insert(dest, d);
        result
    }

    fn blend(&self, dest: &mut Table, sources: &[TableId], pos: f32) -> Result<(), TableError> {
        let pos = pos.clamp(0.0, (sources.len() - 1) as f32);
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(sources.len() - 1);
        let w = pos - lo as f32;
        let a = self.get(sources[lo]).ok_or(TableError::SourceLengthMismatch)?;
        let b = self.get(sources[hi]).ok_or(TableError::SourceLengthMismatch)?;
        if a.len() != dest.len() || b.len() != dest.len() {
            return Err(TableError::SourceLengthMismatch);
        }
        for c in 0..dest.chnls() {
            let ac = a.channel(c);
            let bc = b.channel(c);
            let dc = dest.channel_mut(c);
            for i in 0..dc.len() {
                dc[i] = ac[i] + (bc[i] - ac[i]) * w;
            }
        }
        Ok(())
    }

    /// Sum of source versions, used by morph writers to detect edits.
    pub(crate) fn versions(&self, sources: &[TableId]) -> u64 {
        sources
            .iter()
            .filter_map(|id| self.get(*id))
            .map(|t| t.version())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_interpolation_midpoint() {
        let t = Table::from_frames(vec![vec![0.0, 1.0, 0.0]], 44100.0).unwrap();
        let lin = Interpolator::new(Interp::Linear);
        assert!((t.read(0, 0.5, &lin, AddressMode::Clamp) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn wrap_addressing_folds_index() {
        let t = Table::from_frames(vec![vec![1.0, 2.0, 3.0, 4.0]], 44100.0).unwrap();
        let none = Interpolator::new(Interp::None);
        assert_eq!(t.read(0, 5.0, &none, AddressMode::Wrap), 2.0);
        assert_eq!(t.read(0, -1.0, &none, AddressMode::Wrap), 4.0);
        assert_eq!(t.read(0, 9.0, &none, AddressMode::Clamp), 4.0);
    }

    #[test]
    fn normalize_rescales_peak_to_one() {
        let mut t = Table::from_frames(vec![vec![0.1, -0.5, 0.25]], 44100.0).unwrap();
        t.normalize();
        let peak = t.channel(0).iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn versions_track_mutation() {
        let mut t = Table::new(16, 1, 44100.0).unwrap();
        let v0 = t.version();
        t.set_sample(0, 3, 0.5);
        assert!(t.version() > v0);
        let v1 = t.version();
        t.normalize();
        assert!(t.version() > v1);
    }

    #[test]
    fn morph_endpoints_and_midpoint() {
        let mut store = TableStore::new();
        let a = store.insert(Table::from_frames(vec![vec![0.0; 8]], 44100.0).unwrap());
        let b = store.insert(Table::from_frames(vec![vec![1.0; 8]], 44100.0).unwrap());
        let d = store.insert(Table::new(8, 1, 44100.0).unwrap());

        store.morph_into(d, &[a, b], 0.0).unwrap();
        assert!(store.get(d).unwrap().channel(0).iter().all(|&s| s == 0.0));

        store.morph_into(d, &[a, b], 1.0).unwrap();
        assert!(store.get(d).unwrap().channel(0).iter().all(|&s| s == 1.0));

        store.morph_into(d, &[a, b], 0.5).unwrap();
        assert!(store
            .get(d)
            .unwrap()
            .channel(0)
            .iter()
            .all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn morph_rejects_self_source() {
        let mut store = TableStore::new();
        let a = store.insert(Table::new(8, 1, 44100.0).unwrap());
        let b = store.insert(Table::new(8, 1, 44100.0).unwrap());
        assert_eq!(
            store.morph_into(a, &[a, b], 0.5),
            Err(TableError::SelfSource)
        );
    }

    #[test]
    fn reshape_passes_through_anchors() {
        let mut t = Table::new(9, 1, 44100.0).unwrap();
        let anchors = [(0.0, 0.0), (4.0, 1.0), (8.0, -1.0)];
        t.reshape(0, &anchors, 0.0, 0.0).unwrap();
        let ch = t.channel(0);
        assert!((ch[0] - 0.0).abs() < 1e-6);
        assert!((ch[4] - 1.0).abs() < 1e-6);
        assert!((ch[8] - -1.0).abs() < 1e-6);
    }

    #[test]
    fn harmonics_single_partial_is_sine() {
        let t = Table::sine(64, 44100.0).unwrap();
        let ch = t.channel(0);
        assert!((ch[16] - 1.0).abs() < 1e-3); // quarter cycle peak
        assert!(ch[0].abs() < 1e-6);
    }
}
