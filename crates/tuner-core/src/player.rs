//! Per-station playback handles.
//!
//! `PlayerCache` is an arena indexed by station id: the first `acquire` for a
//! station builds its player through the `PlayerFactory`, every later call
//! returns that same player.  Players are stopped and unloaded between uses
//! but never dropped while the cache lives.

use std::sync::Arc;

use tracing::debug;
use tuner_proto::protocol::{StationDescriptor, StationId, StreamFormat};

use crate::error::ControllerError;
use crate::registry::StationRegistry;

/// Playback capability for one live stream.
///
/// Commands must not block or fail the caller; a backend that cannot start
/// simply never reports `is_playing() == true`.
pub trait Player: Send {
    fn play(&mut self);

    fn stop(&mut self);

    /// Release the underlying stream connection.  The next `play` reconnects.
    fn unload(&mut self);

    fn is_playing(&self) -> bool;
}

/// Builds players for stations on first use.
pub trait PlayerFactory: Send {
    /// Encodings this backend can decode.
    fn supported_formats(&self) -> &[StreamFormat];

    fn create(&self, station: &StationDescriptor, format: StreamFormat) -> Box<dyn Player>;
}

/// Pick the encoding to open a stream with.
///
/// A format named by the URL's extension wins if it is acceptable and
/// supported; otherwise the first preferred format the backend supports.
/// When nothing matches, the top preference is returned and the backend is
/// left to sniff the stream.
pub fn negotiate_format(
    stream_url: &str,
    preferred: &[StreamFormat],
    supported: &[StreamFormat],
) -> StreamFormat {
    let usable = |f: &StreamFormat| preferred.contains(f) && supported.contains(f);

    if let Some(hint) = StreamFormat::from_url(stream_url).filter(usable) {
        return hint;
    }

    preferred
        .iter()
        .copied()
        .find(|f| supported.contains(f))
        .or_else(|| preferred.first().copied())
        .unwrap_or(StreamFormat::Mp3)
}

pub struct PlayerCache {
    registry: Arc<StationRegistry>,
    factory: Box<dyn PlayerFactory>,
    formats: Vec<StreamFormat>,
    slots: Vec<Option<Box<dyn Player>>>,
}

impl PlayerCache {
    pub fn new(
        registry: Arc<StationRegistry>,
        factory: Box<dyn PlayerFactory>,
        formats: Vec<StreamFormat>,
    ) -> Self {
        let slots = (0..registry.len()).map(|_| None).collect();
        Self {
            registry,
            factory,
            formats,
            slots,
        }
    }

    /// Existing player for `id`, creating it on first call.
    pub fn acquire(
        &mut self,
        id: StationId,
    ) -> Result<&mut (dyn Player + 'static), ControllerError> {
        let station = self.registry.lookup(id)?;
        let factory = &self.factory;
        let formats = &self.formats;

        let player = self.slots[id.index()].get_or_insert_with(|| {
            let format =
                negotiate_format(&station.stream_url, formats, factory.supported_formats());
            debug!(
                "PlayerCache: creating player for {} ({}) as {:?}",
                id, station.title, format
            );
            factory.create(station, format)
        });
        Ok(player.as_mut())
    }

    /// Cached player for `id`, without creating one.
    pub fn get_mut(&mut self, id: StationId) -> Option<&mut (dyn Player + 'static)> {
        match self.slots.get_mut(id.index()) {
            Some(Some(player)) => Some(player.as_mut()),
            _ => None,
        }
    }

    /// False for stations never acquired.
    pub fn is_playing(&self, id: StationId) -> bool {
        self.slots
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .is_some_and(|player| player.is_playing())
    }

    pub fn is_cached(&self, id: StationId) -> bool {
        self.slots
            .get(id.index())
            .is_some_and(|slot| slot.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log {
        created: AtomicUsize,
        formats: Mutex<Vec<StreamFormat>>,
    }

    struct FakePlayer {
        playing: bool,
    }

    impl Player for FakePlayer {
        fn play(&mut self) {
            self.playing = true;
        }
        fn stop(&mut self) {
            self.playing = false;
        }
        fn unload(&mut self) {}
        fn is_playing(&self) -> bool {
            self.playing
        }
    }

    struct FakeFactory {
        log: Arc<Log>,
        supported: Vec<StreamFormat>,
    }

    impl PlayerFactory for FakeFactory {
        fn supported_formats(&self) -> &[StreamFormat] {
            &self.supported
        }

        fn create(&self, _station: &StationDescriptor, format: StreamFormat) -> Box<dyn Player> {
            self.log.created.fetch_add(1, Ordering::SeqCst);
            self.log.formats.lock().unwrap().push(format);
            Box::new(FakePlayer { playing: false })
        }
    }

    fn cache(urls: &[&str], supported: Vec<StreamFormat>) -> (PlayerCache, Arc<Log>) {
        let stations = urls
            .iter()
            .enumerate()
            .map(|(i, url)| StationDescriptor {
                id: StationId(i),
                title: format!("s{}", i),
                frequency: String::new(),
                stream_url: url.to_string(),
                metadata_url: format!("{}.xspf", url),
            })
            .collect();
        let log = Arc::new(Log::default());
        let factory = FakeFactory {
            log: log.clone(),
            supported,
        };
        let cache = PlayerCache::new(
            Arc::new(StationRegistry::new(stations)),
            Box::new(factory),
            vec![StreamFormat::Mp3, StreamFormat::Aac],
        );
        (cache, log)
    }

    #[test]
    fn test_negotiate_prefers_url_hint() {
        let both = [StreamFormat::Mp3, StreamFormat::Aac];
        assert_eq!(
            negotiate_format("http://r.test/live.aac", &both, &both),
            StreamFormat::Aac
        );
        assert_eq!(
            negotiate_format("http://r.test/live", &both, &both),
            StreamFormat::Mp3
        );
    }

    #[test]
    fn test_negotiate_falls_back_to_secondary() {
        let both = [StreamFormat::Mp3, StreamFormat::Aac];
        assert_eq!(
            negotiate_format("http://r.test/live.mp3", &both, &[StreamFormat::Aac]),
            StreamFormat::Aac
        );
        assert_eq!(
            negotiate_format("http://r.test/live", &[StreamFormat::Aac], &[]),
            StreamFormat::Aac
        );
    }

    #[test]
    fn test_acquire_creates_once() {
        let (mut cache, log) = cache(
            &["http://r.test/a.mp3", "http://r.test/b", "http://r.test/c.aac"],
            vec![StreamFormat::Mp3, StreamFormat::Aac],
        );
        assert!(!cache.is_cached(StationId(2)));

        let first = cache.acquire(StationId(2)).unwrap() as *const dyn Player as *const ();
        let second = cache.acquire(StationId(2)).unwrap() as *const dyn Player as *const ();
        assert_eq!(first, second);
        assert_eq!(log.created.load(Ordering::SeqCst), 1);
        assert_eq!(*log.formats.lock().unwrap(), vec![StreamFormat::Aac]);
        assert!(cache.is_cached(StationId(2)));
    }

    #[test]
    fn test_is_playing_tracks_handle() {
        let (mut cache, _) = cache(&["http://r.test/a.mp3"], vec![StreamFormat::Mp3]);
        assert!(!cache.is_playing(StationId(0)));
        assert!(!cache.is_playing(StationId(9)));

        cache.acquire(StationId(0)).unwrap().play();
        assert!(cache.is_playing(StationId(0)));

        cache.get_mut(StationId(0)).unwrap().stop();
        assert!(!cache.is_playing(StationId(0)));
    }

    #[test]
    fn test_acquire_unknown_station() {
        let (mut cache, log) = cache(&["http://r.test/a.mp3"], vec![StreamFormat::Mp3]);
        assert!(cache.acquire(StationId(5)).is_err());
        assert!(cache.get_mut(StationId(5)).is_none());
        assert_eq!(log.created.load(Ordering::SeqCst), 0);
    }
}
