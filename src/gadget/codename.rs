/// Codename allocation and the other random values gadgets carry
use crate::{
    db::GadgetStore,
    error::{ApiError, ApiResult},
};
use rand::{seq::SliceRandom, Rng};

pub const CODENAME_PREFIXES: &[&str] = &["The", "Operation", "Project", "Agent", "Mission"];

pub const CODENAME_NAMES: &[&str] = &[
    "Nightingale",
    "Kraken",
    "Phoenix",
    "Shadow",
    "Specter",
    "Ghost",
    "Phantom",
    "Raven",
    "Falcon",
    "Cobra",
    "Viper",
    "Eagle",
    "Wolf",
    "Jaguar",
    "Panther",
];

const SELF_DESTRUCT_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const SELF_DESTRUCT_CODE_LEN: usize = 6;

/// Compose a random `<prefix> <name>` codename
pub fn compose_codename<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefix = CODENAME_PREFIXES.choose(rng).copied().unwrap_or("The");
    let name = CODENAME_NAMES.choose(rng).copied().unwrap_or("Phantom");
    format!("{} {}", prefix, name)
}

/// Six characters drawn uniformly from `[A-Z0-9]`
pub fn generate_self_destruct_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SELF_DESTRUCT_CODE_LEN)
        .map(|_| SELF_DESTRUCT_CHARSET[rng.gen_range(0..SELF_DESTRUCT_CHARSET.len())] as char)
        .collect()
}

/// Mission success probability in whole percent, 0 through 100
pub fn success_probability<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(0..=100)
}

/// Allocates codenames that are unused at the time of return
#[derive(Debug, Clone)]
pub struct CodenameGenerator {
    max_attempts: u32,
}

impl CodenameGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Compose candidates until the store reports one as free.
    ///
    /// The lookup is read-only; callers still rely on the UNIQUE constraint
    /// when inserting, since another request may take the name in between.
    pub async fn generate_unique<S>(&self, store: &S) -> ApiResult<String>
    where
        S: GadgetStore + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            let candidate = compose_codename(&mut rand::thread_rng());

            if !store.codename_exists(&candidate).await? {
                return Ok(candidate);
            }

            tracing::debug!(attempt, codename = %candidate, "Codename collision, retrying");
        }

        tracing::warn!(attempts = self.max_attempts, "Codename space exhausted");
        Err(ApiError::GenerationExhausted {
            attempts: self.max_attempts,
        })
    }
}
