use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use bytes::Bytes;

/// Time base of a unit's timestamps, e.g. 1/90000.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i32,
    den: i32,
}

impl Rational {
    /// The sign is moved to the numerator, so the denominator is never
    /// negative: `-1/-1000` is stored as `1/1000`.
    pub const fn new(num: i32, den: i32) -> Self {
        if den < 0 {
            Self {
                num: num.wrapping_neg(),
                den: den.wrapping_neg(),
            }
        } else {
            Self { num, den }
        }
    }

    pub fn numerator(&self) -> i32 {
        self.num
    }

    pub fn denominator(&self) -> i32 {
        self.den
    }

    /// A usable time base has a positive numerator and denominator.
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(1, 1_000_000)
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Rational> for Rational {
    fn from(value: ffmpeg_next::Rational) -> Self {
        Self::new(value.numerator(), value.denominator())
    }
}

#[cfg(feature = "ffmpeg")]
impl From<Rational> for ffmpeg_next::Rational {
    fn from(value: Rational) -> Self {
        ffmpeg_next::Rational::new(value.num, value.den)
    }
}

/// A timestamp value together with its time base.
///
/// Ordering and equality compare the instant in seconds exactly, by cross
/// multiplication, so `1/1000 @ 10` equals `1/100 @ 1`.
#[derive(Clone, Copy, Debug)]
pub struct Timestamp {
    pub value: i64,
    pub time_base: Rational,
}

impl Timestamp {
    pub fn new(value: i64, time_base: Rational) -> Self {
        Self { value, time_base }
    }

    pub fn seconds(&self) -> f64 {
        self.value as f64 * self.time_base.to_f64()
    }

    // value * num / den as a fraction over the shared denominator den_a * den_b
    fn scaled(&self, other_den: i32) -> i128 {
        self.value as i128 * self.time_base.num as i128 * other_den as i128
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.scaled(other.time_base.den)
            .cmp(&other.scaled(self.time_base.den))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.3}s)", self.value, self.seconds())
    }
}

/// Logical stream a unit belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamTag {
    Video,
    Audio,
    Subtitle,
}

impl Display for StreamTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamTag::Video => "video",
            StreamTag::Audio => "audio",
            StreamTag::Subtitle => "subtitle",
        };
        f.write_str(name)
    }
}

/// One timestamped item moving through the pipeline: an encoded packet or a
/// decoded frame. Units are moved, never cloned, between stages.
#[derive(Debug)]
pub struct Unit<P> {
    payload: P,
    stream: StreamTag,
    pts: Option<i64>,
    dts: Option<i64>,
    time_base: Rational,
    sequence: u64,
}

impl<P> Unit<P> {
    pub fn new(stream: StreamTag, payload: P, time_base: Rational) -> Self {
        Self {
            payload,
            stream,
            pts: None,
            dts: None,
            time_base,
            sequence: 0,
        }
    }

    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn with_dts(mut self, dts: Option<i64>) -> Self {
        self.dts = dts;
        self
    }

    /// Sets both presentation and decode timestamps.
    pub fn with_timestamps(self, pts: i64, dts: i64) -> Self {
        self.with_pts(Some(pts)).with_dts(Some(dts))
    }

    pub fn stream(&self) -> StreamTag {
        self.stream
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    pub fn set_dts(&mut self, dts: Option<i64>) {
        self.dts = dts;
    }

    pub fn set_time_base(&mut self, time_base: Rational) {
        self.time_base = time_base;
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Presentation timestamp paired with the time base, if present.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.pts.map(|pts| Timestamp::new(pts, self.time_base))
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Replaces the payload, keeping tag, timestamps and sequence.
    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> Unit<Q> {
        Unit {
            payload: f(self.payload),
            stream: self.stream,
            pts: self.pts,
            dts: self.dts,
            time_base: self.time_base,
            sequence: self.sequence,
        }
    }
}

/// Unit with an in-memory byte payload.
pub type ByteUnit = Unit<Bytes>;

impl<P> Display for Unit<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unit stream: {}, seq: {}, pts: {:?}, dts: {:?}, time_base: {}",
            self.stream, self.sequence, self.pts, self.dts, self.time_base
        )
    }
}
