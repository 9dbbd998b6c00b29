use std::collections::HashSet;

use crate::{
    queue::{QueueReceiver, QueueSender},
    stage::{Stage, StageStats},
    unit::{StreamTag, Unit},
};

/// Demultiplexing stage: routes each unit to the output registered for its
/// stream tag. Units with no registered route are dropped.
pub struct SplitStage<P> {
    name: String,
    input: QueueReceiver<Unit<P>>,
    routes: Vec<(StreamTag, QueueSender<Unit<P>>)>,
}

impl<P: Send> SplitStage<P> {
    pub fn new(name: &str, input: QueueReceiver<Unit<P>>) -> Self {
        Self {
            name: name.to_string(),
            input,
            routes: Vec::new(),
        }
    }

    /// Registers the output for `tag`. A later route for the same tag
    /// replaces the earlier one, which is closed.
    pub fn route(mut self, tag: StreamTag, output: QueueSender<Unit<P>>) -> Self {
        if let Some(pos) = self.routes.iter().position(|(t, _)| *t == tag) {
            let (_, replaced) = self.routes.swap_remove(pos);
            replaced.close();
        }
        self.routes.push((tag, output));
        self
    }

    pub fn tags(&self) -> Vec<StreamTag> {
        self.routes.iter().map(|(tag, _)| *tag).collect()
    }
}

impl<P: Send> Stage for SplitStage<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>) -> StageStats {
        let Self {
            name,
            input,
            routes,
        } = *self;
        let mut stats = StageStats::new(&name);
        let mut unrouted = HashSet::new();
        let tags: Vec<StreamTag> = routes.iter().map(|(tag, _)| *tag).collect();
        log::info!("{}: started with routes {:?}", name, tags);

        for unit in input {
            stats.received += 1;
            match routes.iter().find(|(tag, _)| *tag == unit.stream()) {
                Some((_, output)) => {
                    output.push(unit);
                    stats.emitted += 1;
                }
                None => {
                    if unrouted.insert(unit.stream()) {
                        log::warn!(
                            "{}: no route for {} units, dropping them",
                            name,
                            unit.stream()
                        );
                    }
                    stats.dropped += 1;
                }
            }
        }

        for (_, output) in routes {
            output.close();
        }
        log::info!("{}", stats);
        stats
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::queue::channel;
    use crate::unit::Rational;

    fn unit(tag: StreamTag, pts: i64) -> Unit<Bytes> {
        Unit::new(tag, Bytes::new(), Rational::new(1, 1000)).with_timestamps(pts, pts)
    }

    #[test]
    fn test_split_routes_by_tag_and_closes_all_outputs() {
        let (in_tx, in_rx) = channel();
        let (video_tx, video_rx) = channel();
        let (audio_tx, audio_rx) = channel();

        for (tag, pts) in [
            (StreamTag::Video, 0),
            (StreamTag::Audio, 0),
            (StreamTag::Subtitle, 5),
            (StreamTag::Video, 40),
            (StreamTag::Audio, 23),
        ] {
            in_tx.push(unit(tag, pts));
        }
        in_tx.close();

        let stage = SplitStage::new("split", in_rx)
            .route(StreamTag::Video, video_tx)
            .route(StreamTag::Audio, audio_tx);
        let stats = Box::new(stage).run();

        assert_eq!(stats.received, 5);
        assert_eq!(stats.emitted, 4);
        assert_eq!(stats.dropped, 1);

        let video: Vec<_> = video_rx.map(|u| u.pts()).collect();
        let audio: Vec<_> = audio_rx.map(|u| u.pts()).collect();
        assert_eq!(video, vec![Some(0), Some(40)]);
        assert_eq!(audio, vec![Some(0), Some(23)]);
    }

    #[test]
    fn test_split_empty_input_still_signals_eof() {
        let (in_tx, in_rx) = channel::<Unit<Bytes>>();
        let (video_tx, video_rx) = channel();
        in_tx.close();

        let stage = SplitStage::new("split", in_rx).route(StreamTag::Video, video_tx);
        let stats = Box::new(stage).run();
        assert_eq!(stats.received, 0);
        assert!(video_rx.is_eof());
        assert!(video_rx.pop().is_none());
    }

    #[test]
    fn test_duplicate_route_replaces_previous() {
        let (_in_tx, in_rx) = channel::<Unit<Bytes>>();
        let (first_tx, first_rx) = channel();
        let (second_tx, _second_rx) = channel();

        let stage = SplitStage::new("split", in_rx)
            .route(StreamTag::Video, first_tx)
            .route(StreamTag::Video, second_tx);
        assert_eq!(stage.tags(), vec![StreamTag::Video]);
        assert!(first_rx.is_eof());
    }
}
