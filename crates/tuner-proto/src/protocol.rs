use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a station in the configured list.  Stable for the lifetime of
/// the process because the station list never changes after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub usize);

impl StationId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One configured live stream.  Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationDescriptor {
    pub id: StationId,
    pub title: String,
    /// Dial label shown before the title; empty for internet-only stations.
    #[serde(default)]
    pub frequency: String,
    pub stream_url: String,
    /// Icecast XSPF (or any XML feed with a `<title>`) describing what is on air.
    pub metadata_url: String,
}

impl StationDescriptor {
    /// Row label: `"<frequency> <title>"`, or just the title when no frequency is set.
    pub fn display_label(&self) -> String {
        let freq = self.frequency.trim();
        if freq.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", freq, self.title)
        }
    }
}

/// Lossy encodings a live stream may be served in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    Mp3,
    Aac,
}

impl StreamFormat {
    /// Name as understood by ffmpeg/libavformat demuxers.
    pub fn demuxer_name(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
        }
    }

    /// Guess the format from a URL's file extension, ignoring any query string.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let last = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = last.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "aac" | "adts" => Some(Self::Aac),
            _ => None,
        }
    }
}

/// Notifications emitted by the controller for the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DisplayEvent {
    StationActiveChanged { station: StationId, active: bool },
    MetadataTitle { station: StationId, title: String },
}

/// Inputs accepted by the daemon's control surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// A click on a station row (toggle semantics).
    Select { station: StationId },
    Stop,
}

/// Per-row view state, as the display layer would render it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationView {
    pub label: String,
    pub active: bool,
    pub now_playing: Option<String>,
}

/// Snapshot of every row plus a revision counter bumped on each change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayState {
    #[serde(default)]
    pub rev: u64,
    pub stations: Vec<StationView>,
}

impl DisplayState {
    pub fn new(stations: &[StationDescriptor]) -> Self {
        Self {
            rev: 0,
            stations: stations
                .iter()
                .map(|s| StationView {
                    label: s.display_label(),
                    ..StationView::default()
                })
                .collect(),
        }
    }

    pub fn active_station(&self) -> Option<StationId> {
        self.stations.iter().position(|s| s.active).map(StationId)
    }

    /// Apply one event.  The now-playing text is only visible while the row
    /// is active, so deactivating a row clears it.
    pub fn apply(&mut self, event: &DisplayEvent) {
        match event {
            DisplayEvent::StationActiveChanged { station, active } => {
                if let Some(view) = self.stations.get_mut(station.index()) {
                    view.active = *active;
                    if !*active {
                        view.now_playing = None;
                    }
                }
            }
            DisplayEvent::MetadataTitle { station, title } => {
                if let Some(view) = self.stations.get_mut(station.index()) {
                    view.now_playing = Some(title.clone());
                }
            }
        }
        self.rev += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(idx: usize, freq: &str) -> StationDescriptor {
        StationDescriptor {
            id: StationId(idx),
            title: format!("Station {}", idx),
            frequency: freq.to_string(),
            stream_url: format!("https://example.test/{}.mp3", idx),
            metadata_url: format!("https://example.test/{}.mp3.xspf", idx),
        }
    }

    #[test]
    fn test_display_label() {
        assert_eq!(station(0, "").display_label(), "Station 0");
        assert_eq!(station(1, " 81.4 ").display_label(), "81.4 Station 1");
    }

    #[test]
    fn test_display_state_apply() {
        let mut state = DisplayState::new(&[station(0, ""), station(1, "")]);
        state.apply(&DisplayEvent::StationActiveChanged {
            station: StationId(1),
            active: true,
        });
        state.apply(&DisplayEvent::MetadataTitle {
            station: StationId(1),
            title: "Artist - Track".into(),
        });
        assert_eq!(state.active_station(), Some(StationId(1)));
        assert_eq!(state.stations[1].now_playing.as_deref(), Some("Artist - Track"));
        assert_eq!(state.rev, 2);

        state.apply(&DisplayEvent::StationActiveChanged {
            station: StationId(1),
            active: false,
        });
        assert_eq!(state.active_station(), None);
        assert!(state.stations[1].now_playing.is_none());
    }

    #[test]
    fn test_format_from_url() {
        assert_eq!(
            StreamFormat::from_url("https://stream.parisson.com/icecast/deefuzz_full.mp3"),
            Some(StreamFormat::Mp3)
        );
        assert_eq!(
            StreamFormat::from_url("http://radio.test/live.AAC?token=abc"),
            Some(StreamFormat::Aac)
        );
        assert_eq!(StreamFormat::from_url("http://radio.test/live"), None);
        assert_eq!(StreamFormat::from_url("http://radio.test.mp3/live"), None);
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_string(&DisplayEvent::StationActiveChanged {
            station: StationId(3),
            active: true,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"event":"StationActiveChanged","station":3,"active":true}"#
        );
        let cmd: Command = serde_json::from_str(r#"{"cmd":"Select","station":2}"#).unwrap();
        assert_eq!(cmd, Command::Select { station: StationId(2) });
    }
}
