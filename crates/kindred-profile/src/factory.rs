use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic bot baseline profile (C2, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProfile {
    pub basic_info: serde_json::Value,
    pub big_five: [f64; 5],
    pub persona: serde_json::Value,
}

/// Deterministic user baseline profile (C2, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub basic_info: serde_json::Value,
    pub inferred_profile: serde_json::Value,
}

const BIG_FIVE_TRAITS: [&str; 5] = [
    "openness",
    "conscientiousness",
    "extraversion",
    "agreeableness",
    "neuroticism",
];

const OCCUPATIONS: &[&str] = &[
    "illustrator",
    "barista",
    "grad student",
    "indie developer",
    "music teacher",
    "translator",
    "shop owner",
    "photographer",
];

const HOBBIES: &[&str] = &[
    "night hikes",
    "vinyl records",
    "street photography",
    "baking bread",
    "language learning",
    "tabletop games",
    "urban sketching",
    "aquariums",
];

/// `int(sha256("bot"|"user" || id).hexdigest()[:8], 16)`, matching the
/// reference implementation's seed derivation so a given id always yields
/// the same profile.
fn seed_from(tag: &str, id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("{tag}|{id}").as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    u64::from_str_radix(&hex, 16).unwrap_or(0)
}

fn valid_age(candidate: u32, rng: &mut StdRng) -> u32 {
    if (18..=35).contains(&candidate) {
        candidate
    } else {
        rng.gen_range(20..=25)
    }
}

/// Deterministic bot baseline profile from the bot's id.
pub fn generate_bot_profile(bot_id: &str) -> BotProfile {
    let mut rng = StdRng::seed_from_u64(seed_from("bot", bot_id));

    let age = valid_age(rng.gen_range(18..=40), &mut rng);
    let occupation = OCCUPATIONS[rng.gen_range(0..OCCUPATIONS.len())];
    let hobbies: Vec<&str> = {
        let mut pool: Vec<&str> = HOBBIES.to_vec();
        let mut picked = Vec::new();
        for _ in 0..3.min(pool.len()) {
            let idx = rng.gen_range(0..pool.len());
            picked.push(pool.remove(idx));
        }
        picked
    };

    let big_five: Vec<f64> = BIG_FIVE_TRAITS
        .iter()
        .map(|_| rng.gen_range(-0.8..=0.8))
        .collect();
    let big_five: [f64; 5] = big_five.try_into().unwrap();

    let persona = serde_json::json!({
        "attributes": {
            "age": age,
            "occupation": occupation,
        },
        "collections": { "hobbies": hobbies },
        "lore": [],
    });

    BotProfile {
        basic_info: serde_json::json!({ "age": age, "occupation": occupation }),
        big_five,
        persona,
    }
}

/// Deterministic user baseline profile from the caller-supplied external id.
pub fn generate_user_profile(external_id: &str) -> UserProfile {
    let mut rng = StdRng::seed_from_u64(seed_from("user", external_id));

    let age = valid_age(rng.gen_range(16..=45), &mut rng);
    let interests: Vec<&str> = {
        let mut pool: Vec<&str> = HOBBIES.to_vec();
        let mut picked = Vec::new();
        for _ in 0..2.min(pool.len()) {
            let idx = rng.gen_range(0..pool.len());
            picked.push(pool.remove(idx));
        }
        picked
    };

    UserProfile {
        basic_info: serde_json::json!({ "age": age }),
        inferred_profile: serde_json::json!({ "interests": interests, "confidence": 0.2 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_profile_is_deterministic_by_id() {
        let a = generate_bot_profile("bot-123");
        let b = generate_bot_profile("bot-123");
        assert_eq!(a.big_five, b.big_five);
        assert_eq!(a.basic_info, b.basic_info);
    }

    #[test]
    fn bot_profile_differs_across_ids() {
        let a = generate_bot_profile("bot-123");
        let b = generate_bot_profile("bot-456");
        assert_ne!(a.big_five, b.big_five);
    }

    #[test]
    fn big_five_within_range() {
        let p = generate_bot_profile("bot-range-check");
        for v in p.big_five {
            assert!((-0.8..=0.8).contains(&v));
        }
    }

    #[test]
    fn user_profile_is_deterministic_by_external_id() {
        let a = generate_user_profile("ext-u1");
        let b = generate_user_profile("ext-u1");
        assert_eq!(a.basic_info, b.basic_info);
    }
}
