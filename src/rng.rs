use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Seeded random source driving one Markov chain.
///
/// Wraps a `ChaCha8Rng` so the complete generator state (seed, stream and
/// position in the key stream) serializes with the rest of a checkpoint and a
/// restored chain continues with exactly the same draws. Independent replicas
/// share a seed and use distinct ChaCha streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QmcRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl QmcRng {
    /// Make a generator for `stream` from a fixed seed.
    pub fn from_seed(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self { seed, rng }
    }

    /// Make a generator for `stream` from a seed drawn from the thread rng.
    pub fn from_entropy(stream: u64) -> Self {
        let seed = rand::thread_rng().gen();
        Self::from_seed(seed, stream)
    }

    /// The seed this generator was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The ChaCha stream of this generator.
    pub fn stream(&self) -> u64 {
        self.rng.get_stream()
    }

    /// Position in the key stream, counted in 32-bit words.
    pub fn word_pos(&self) -> u128 {
        self.rng.get_word_pos()
    }
}

impl RngCore for QmcRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
