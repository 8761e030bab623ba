use rand::Rng;

/// How the next track is picked once the current one ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOrder {
    /// Round-robin in catalog order.
    Sequential,
    /// Uniform random, never the same track twice in a row (when there is
    /// more than one to choose from).
    Shuffle,
}

impl PlaybackOrder {
    pub fn from_shuffle_flag(shuffle: bool) -> Self {
        if shuffle {
            PlaybackOrder::Shuffle
        } else {
            PlaybackOrder::Sequential
        }
    }
}

/// Index of the current track plus the anchor used to avoid shuffle repeats.
///
/// `last_shuffle` is kept apart from `current`: it is the previous random
/// draw, not the sequential predecessor.
#[derive(Debug, Clone)]
pub struct Cursor {
    len: usize,
    order: PlaybackOrder,
    current: usize,
    last_shuffle: Option<usize>,
}

impl Cursor {
    /// `len` must be non-zero (a `Catalog` is never empty).
    pub fn new(len: usize, order: PlaybackOrder) -> Self {
        assert!(len > 0, "cursor over an empty catalog");
        Self {
            len,
            order,
            current: 0,
            last_shuffle: None,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn order(&self) -> PlaybackOrder {
        self.order
    }

    pub fn last_shuffle(&self) -> Option<usize> {
        self.last_shuffle
    }

    /// Select the first track: index 0, or a random draw under shuffle.
    pub fn initial<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        self.current = match self.order {
            PlaybackOrder::Sequential => 0,
            PlaybackOrder::Shuffle => self.draw(rng),
        };
        self.current
    }

    /// Move to the next track and return its index.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        self.current = match self.order {
            PlaybackOrder::Sequential => (self.current + 1) % self.len,
            PlaybackOrder::Shuffle => self.draw(rng),
        };
        self.current
    }

    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let next = loop {
            let candidate = rng.gen_range(0..self.len);
            if self.len == 1 || Some(candidate) != self.last_shuffle {
                break candidate;
            }
        };
        self.last_shuffle = Some(next);
        next
    }
}
