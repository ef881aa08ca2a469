use crate::participant::{
    ParticipantId,
    RemoteParticipant,
};
use std::collections::{
    hash_map::Entry,
    HashMap,
};

/// Read-only view of the remote participants, in the order the transport
/// reported them.
///
/// Each transport notification replaces the whole view at once, so readers
/// never observe a half-applied update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantRegistry {
    participants: Vec<RemoteParticipant>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one transport notification.
    ///
    /// A participant reported twice keeps its first position and its last
    /// reported state.
    pub fn replace(&mut self, update: impl IntoIterator<Item = RemoteParticipant>) {
        let mut participants: Vec<RemoteParticipant> = Vec::new();
        let mut positions: HashMap<ParticipantId, usize> = HashMap::new();
        for participant in update {
            match positions.entry(participant.id.clone()) {
                Entry::Occupied(position) => participants[*position.get()] = participant,
                Entry::Vacant(position) => {
                    position.insert(participants.len());
                    participants.push(participant);
                }
            }
        }
        self.participants = participants;
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.participants.iter()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RemoteParticipant> {
        self.participants.iter().find(|participant| &participant.id == id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn to_vec(&self) -> Vec<RemoteParticipant> {
        self.participants.clone()
    }
}

impl FromIterator<RemoteParticipant> for ParticipantRegistry {
    fn from_iter<T: IntoIterator<Item = RemoteParticipant>>(iter: T) -> Self {
        let mut registry = Self::new();
        registry.replace(iter);
        registry
    }
}
