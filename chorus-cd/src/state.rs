//! Coordinator state: the single current-song record
//!
//! Created empty at startup, replaced wholesale on each accepted publish,
//! never mutated otherwise. Owned exclusively by the command loop; readers
//! only ever see it through `get song` replies, so a name is always paired
//! with the start instant from the same publish.

/// Descriptor of the currently scheduled song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSong {
    /// File name the song was published under.
    pub name: String,
    /// Scheduled start, microseconds since the epoch on the reference clock.
    /// Assigned exactly once per publish and never mutated.
    pub start_us: i64,
}

/// The coordinator's only piece of mutable state.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    current: Option<CurrentSong>,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current song with a freshly published one.
    pub fn replace(&mut self, name: String, start_us: i64) {
        self.current = Some(CurrentSong { name, start_us });
    }

    pub fn current(&self) -> Option<&CurrentSong> {
        self.current.as_ref()
    }

    /// Wire form of the current record: `(name, start_us)`, with the
    /// empty-name/zero-start sentinel when nothing was ever published.
    pub fn descriptor(&self) -> (String, i64) {
        match &self.current {
            Some(song) => (song.name.clone(), song.start_us),
            None => (String::new(), 0),
        }
    }
}
