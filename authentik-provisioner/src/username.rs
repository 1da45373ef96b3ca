//! Username generation and collision-checked allocation

use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::client::IdentityClient;
use crate::error::{Error, Result};

/// Upper bound on candidates tried by [`allocate_unique`]
pub const MAX_ATTEMPTS: usize = 50;

const ADJECTIVES: &[&str] = &[
    "amber", "azure", "blue", "bronze", "coral", "crimson", "cyan", "gold", "green", "indigo",
    "jade", "lime", "magenta", "maroon", "navy", "olive", "orange", "purple", "red", "silver",
    "teal", "violet", "white", "yellow", "swift", "bright", "cool", "dark", "easy", "fast", "good",
    "happy", "light", "lucky", "mega", "nice", "prime", "quick", "rapid", "safe", "tech", "ultra",
    "vivid", "wise", "brave", "calm", "eager", "fierce", "gentle", "keen", "bold", "smart",
    "strong", "wild", "alpha", "beta", "cyber", "delta", "echo", "flux", "gamma", "hyper",
    "ionic", "jazz", "lunar", "micro", "nexus", "omega", "pixel", "quad", "ruby", "solar",
    "turbo", "vector", "binary", "crypto", "digital", "quantum", "neural", "plasma", "sonic",
    "static", "virtual", "storm", "frost", "rain", "wind", "cloud", "snow", "ice", "flame", "sun",
    "star", "moon", "dawn", "dusk", "nova", "cosmic", "ocean", "river", "forest", "mountain",
    "desert",
];

const NOUNS: &[&str] = &[
    "air", "base", "byte", "code", "data", "edge", "file", "grid", "hash", "icon", "jump", "key",
    "link", "mail", "node", "path", "quad", "root", "sync", "task", "user", "void", "wave", "xray",
    "zone", "app", "bit", "cap", "disk", "echo", "flow", "gate", "host", "info", "jack", "kit",
    "log", "map", "net", "port", "ram", "cpu", "gpu", "ssd", "lan", "wan", "dns", "ip", "ssl",
    "ssh", "ftp", "http", "ping", "boot", "core", "raid", "bios", "cache", "chip", "cloud", "dock",
    "fork", "heap", "loop", "menu", "mime", "null", "pipe", "pool", "mind", "soul", "zeit", "form",
    "pulse", "spark", "storm", "ward", "zero", "apex", "arch", "dome", "flex", "fold", "hub",
    "beam", "bolt", "cube", "gear", "lens", "orb", "ring", "seed", "tank", "tube", "wire", "arc",
    "box", "coil", "deck",
];

/// Something that can tell whether a username is already taken
pub trait UsernameDirectory {
    fn username_exists(&self, candidate: &str) -> Result<bool>;
}

impl UsernameDirectory for IdentityClient {
    fn username_exists(&self, candidate: &str) -> Result<bool> {
        Ok(!self.find_users(candidate)?.is_empty())
    }
}

/// Random adjective + noun + 1000..=99999, e.g. `swiftnode4821`
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + CryptoRng>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("swift");
    let noun = NOUNS.choose(rng).copied().unwrap_or("node");
    let number: u32 = rng.gen_range(1000..=99999);
    format!("{}{}{}", adjective, noun, number).to_lowercase()
}

/// Lower-case letters followed by a 4 or 5 digit suffix
pub fn is_valid_username(username: &str) -> bool {
    let digits = username
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    let letters = &username[..username.len() - digits];

    (4..=5).contains(&digits)
        && letters.len() >= 2
        && letters.bytes().all(|b| b.is_ascii_lowercase())
}

/// Find a username the directory does not know yet.
///
/// Repeated candidates and failed lookups both use up an attempt, so the
/// directory sees at most [`MAX_ATTEMPTS`] queries.
pub fn allocate_unique<D: UsernameDirectory + ?Sized>(directory: &D) -> Result<String> {
    allocate_unique_with(directory, generate)
}

pub fn allocate_unique_with<D, G>(directory: &D, mut next_candidate: G) -> Result<String>
where
    D: UsernameDirectory + ?Sized,
    G: FnMut() -> String,
{
    let mut tried = HashSet::new();

    for attempt in 1..=MAX_ATTEMPTS {
        let candidate = next_candidate();
        debug!("Username attempt {}: {}", attempt, candidate);

        if !tried.insert(candidate.clone()) {
            continue;
        }

        match directory.username_exists(&candidate) {
            Ok(false) => {
                info!("Allocated username {} after {} attempts", candidate, attempt);
                return Ok(candidate);
            }
            Ok(true) => debug!("Username {} is taken", candidate),
            Err(e) => warn!("Username check for {} failed: {}", candidate, e),
        }
    }

    Err(Error::AllocationExhausted {
        attempts: MAX_ATTEMPTS,
    })
}
