use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng};

pub const PASSWORD_LENGTH: usize = 16;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
pub const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Generate a 16 character login credential with at least one upper-case
/// letter, lower-case letter, digit and symbol
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + CryptoRng>(rng: &mut R) -> String {
    let classes = [UPPERCASE, LOWERCASE, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = Vec::with_capacity(PASSWORD_LENGTH);
    for class in classes {
        chars.push(class[rng.gen_range(0..class.len())]);
    }
    while chars.len() < PASSWORD_LENGTH {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(rng);

    chars.into_iter().map(char::from).collect()
}
