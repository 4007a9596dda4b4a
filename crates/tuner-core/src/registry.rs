use tuner_proto::protocol::{StationDescriptor, StationId};

use crate::error::ControllerError;

/// The fixed, ordered station list.  Read-only after construction.
#[derive(Debug, Clone)]
pub struct StationRegistry {
    stations: Vec<StationDescriptor>,
}

impl StationRegistry {
    /// Ids are reassigned by position so that `stations()[i].id == StationId(i)`.
    pub fn new(stations: Vec<StationDescriptor>) -> Self {
        let stations = stations
            .into_iter()
            .enumerate()
            .map(|(idx, s)| StationDescriptor {
                id: StationId(idx),
                ..s
            })
            .collect();
        Self { stations }
    }

    pub fn stations(&self) -> &[StationDescriptor] {
        &self.stations
    }

    pub fn get(&self, id: StationId) -> Option<&StationDescriptor> {
        self.stations.get(id.index())
    }

    pub fn lookup(&self, id: StationId) -> Result<&StationDescriptor, ControllerError> {
        self.get(id)
            .ok_or(ControllerError::UnknownStation(id, self.stations.len()))
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
