use tuner_proto::protocol::{DisplayEvent, StationId};

/// Receiver for everything the display layer needs to know.  The controller
/// holds no other reference to presentation state.
pub trait DisplaySink: Send + Sync {
    fn on_station_active_changed(&self, station: StationId, active: bool);

    fn on_metadata_title(&self, station: StationId, title: &str);
}

/// Adapts any `Fn(DisplayEvent)` into a sink.
impl<F> DisplaySink for F
where
    F: Fn(DisplayEvent) + Send + Sync,
{
    fn on_station_active_changed(&self, station: StationId, active: bool) {
        self(DisplayEvent::StationActiveChanged { station, active })
    }

    fn on_metadata_title(&self, station: StationId, title: &str) {
        self(DisplayEvent::MetadataTitle {
            station,
            title: title.to_string(),
        })
    }
}
