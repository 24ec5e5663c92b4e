use rand::{seq::IndexedRandom, Rng};

pub const OTP_LENGTH: usize = 6;

const USERNAME_BASES: [&str; 3] = ["user", "member", "guest"];
const USERNAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Six random decimal digits, leading zeros allowed.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..OTP_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Compares a submitted code with the stored one without short-circuiting.
pub fn codes_match(expected: &str, submitted: &str) -> bool {
    let (a, b) = (expected.as_bytes(), submitted.trim().as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// One username candidate derived from the first name.
///
/// Callers loop until the candidate is unused; collisions are rare enough that
/// a handful of attempts always suffices in practice.
pub fn username_candidate(first_name: &str) -> String {
    let mut rng = rand::rng();

    let cleaned: String = first_name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(30)
        .collect();
    let base = if cleaned.is_empty() {
        USERNAME_BASES.choose(&mut rng).copied().unwrap_or("user").to_string()
    } else {
        cleaned
    };

    match rng.random_range(0..4) {
        0 => format!("{}_{}", base, rng.random_range(1000..=9999)),
        1 => format!("{}.{}", base, rng.random_range(1000..=9999)),
        2 => {
            let letter = char::from(b'a' + rng.random_range(0..26u8));
            format!("{}{}{}", base, letter, rng.random_range(10..=99))
        }
        _ => {
            let suffix: String = (0..4)
                .map(|_| {
                    let idx = rng.random_range(0..USERNAME_ALPHABET.len());
                    char::from(USERNAME_ALPHABET[idx])
                })
                .collect();
            format!("{}_{}", base, suffix)
        }
    }
}
