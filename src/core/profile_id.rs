/*
 * Profile identifier generation. Identifiers are 8-character base-36 strings drawn
 * from one process-wide pseudo-random source. Uniqueness is resolved purely by
 * rejection: a candidate that is already taken is discarded and another one drawn,
 * with no persisted counter involved.
 *
 * Identifiers double as file stems in the profiles directory, so `is_valid_profile_id`
 * also guards ids that callers supply themselves.
 */
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, OnceLock, PoisonError};

pub const PROFILE_ID_LENGTH: usize = 8;
const PROFILE_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static PROFILE_ID_SOURCE: OnceLock<Mutex<StdRng>> = OnceLock::new();

/*
 * Installs the process-wide random source. A fixed `seed` makes id sequences
 * reproducible; `None` seeds from the operating system. Returns `false` if the source
 * was already initialized (explicitly or by a previous id request), in which case the
 * existing source is kept.
 */
pub fn init_profile_id_source(seed: Option<u64>) -> bool {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let installed = PROFILE_ID_SOURCE.set(Mutex::new(rng)).is_ok();
    if installed {
        log::debug!("ProfileId: Initialized id source (seeded: {}).", seed.is_some());
    } else {
        log::warn!("ProfileId: Id source already initialized; keeping the existing one.");
    }
    installed
}

fn id_source() -> &'static Mutex<StdRng> {
    PROFILE_ID_SOURCE.get_or_init(|| Mutex::new(StdRng::from_os_rng()))
}

pub fn random_profile_id() -> String {
    let mut rng = id_source().lock().unwrap_or_else(PoisonError::into_inner);
    (0..PROFILE_ID_LENGTH)
        .map(|_| PROFILE_ID_ALPHABET[rng.random_range(0..PROFILE_ID_ALPHABET.len())] as char)
        .collect()
}

/*
 * Draws candidates until `is_taken` rejects none. There is no retry limit; with 36^8
 * possible ids and registries of a few hundred entries a second draw is already rare.
 */
pub fn generate_unique_profile_id(is_taken: impl Fn(&str) -> bool) -> String {
    let mut attempts: u64 = 0;
    loop {
        let candidate = random_profile_id();
        attempts = attempts.saturating_add(1);
        if !is_taken(&candidate) {
            if attempts > 1 {
                log::debug!("ProfileId: Found free id '{candidate}' after {attempts} attempts.");
            }
            return candidate;
        }
        log::trace!("ProfileId: Candidate '{candidate}' already taken, retrying.");
    }
}

pub fn is_valid_profile_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

pub fn is_valid_profile_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(is_valid_profile_id_char)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashSet;

    #[test]
    fn test_random_profile_id_format() {
        for _ in 0..100 {
            let id = random_profile_id();
            assert_eq!(id.len(), PROFILE_ID_LENGTH);
            assert!(
                id.bytes().all(|b| PROFILE_ID_ALPHABET.contains(&b)),
                "Unexpected character in id {id}"
            );
            assert!(is_valid_profile_id(&id));
        }
    }

    #[test]
    fn test_generate_unique_profile_id_retries_until_free() {
        // Arrange: reject the first three candidates
        let rejected = Cell::new(0);
        let is_taken = |_: &str| {
            if rejected.get() < 3 {
                rejected.set(rejected.get() + 1);
                true
            } else {
                false
            }
        };

        // Act
        let id = generate_unique_profile_id(is_taken);

        // Assert
        assert_eq!(rejected.get(), 3);
        assert_eq!(id.len(), PROFILE_ID_LENGTH);
    }

    #[test]
    fn test_generate_unique_profile_id_never_repeats_registered_ids() {
        let mut registered = HashSet::new();
        for _ in 0..2_000 {
            let id = generate_unique_profile_id(|candidate| registered.contains(candidate));
            assert!(registered.insert(id), "Generated an id that was already registered");
        }
    }

    #[test]
    fn test_is_valid_profile_id() {
        assert!(is_valid_profile_id("abc"));
        assert!(is_valid_profile_id("Default_Profile-1"));
        assert!(!is_valid_profile_id(""));
        assert!(!is_valid_profile_id("../escape"));
        assert!(!is_valid_profile_id("with space"));
        assert!(!is_valid_profile_id("dots.json"));
    }
}
