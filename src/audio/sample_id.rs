// Session-scoped handle for a decoded buffer registered with an audio sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SampleId(pub u64);

// Hands out unique ids. Owned by whoever registers buffers, not a global.
#[derive(Debug, Default)]
pub struct SampleIds {
    next: u64,
}

impl SampleIds {
    pub fn next_id(&mut self) -> SampleId {
        let id = SampleId(self.next);
        self.next += 1;
        id
    }
}
