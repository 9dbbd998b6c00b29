use ffmpeg_next::frame;

/// Decoded payload of a branch.
pub enum RawFrame {
    Video(frame::Video),
    Audio(frame::Audio),
}

impl RawFrame {
    pub fn pts(&self) -> Option<i64> {
        match self {
            RawFrame::Video(frame) => frame.pts(),
            RawFrame::Audio(frame) => frame.pts(),
        }
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        match self {
            RawFrame::Video(frame) => frame.set_pts(pts),
            RawFrame::Audio(frame) => frame.set_pts(pts),
        }
    }

    /// Best-effort timestamp chosen by the decoder, falling back to pts.
    pub fn best_effort_pts(&self) -> Option<i64> {
        let ts = match self {
            RawFrame::Video(frame) => frame.timestamp(),
            RawFrame::Audio(frame) => frame.timestamp(),
        };
        ts.or_else(|| self.pts())
    }

    /// Sample count of an audio frame, zero for video.
    pub fn samples(&self) -> usize {
        match self {
            RawFrame::Video(_) => 0,
            RawFrame::Audio(frame) => frame.samples(),
        }
    }
}

impl From<frame::Video> for RawFrame {
    fn from(frame: frame::Video) -> Self {
        RawFrame::Video(frame)
    }
}

impl From<frame::Audio> for RawFrame {
    fn from(frame: frame::Audio) -> Self {
        RawFrame::Audio(frame)
    }
}
