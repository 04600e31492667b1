/// Bounded buffer of processed items waiting to be written in one commit.
pub struct Chunk<O> {
    items: Vec<O>,
    chunk_size: usize,
}

impl<O> Chunk<O> {
    pub fn new(chunk_size: usize) -> Chunk<O> {
        Chunk {
            items: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    /// Appends an item. The caller flushes as soon as [`Chunk::is_full`] holds,
    /// so the buffer never grows beyond `chunk_size`.
    pub fn add_item(&mut self, item: O) {
        debug_assert!(self.items.len() < self.chunk_size);
        self.items.push(item);
    }

    pub fn get_items(&self) -> &[O] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.chunk_size
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
