//! Username synthesis: niche-indexed prefixes plus random digits.

use rand::Rng;

use crate::storage::{Database, DatabaseError};

/// Prefix pool for a niche. Unknown niches fall back to a neutral prefix.
fn prefixes(niche_slug: &str) -> &'static [&'static str] {
    match niche_slug {
        "personal_finance" => &["money", "wealth", "finance", "cash", "invest"],
        "ai_storytelling" => &["story", "tales", "narrative", "fiction", "epic"],
        "tech_ai_tools" => &["tech", "ai", "digital", "code", "smart"],
        "motivation" => &["grind", "hustle", "mindset", "growth", "win"],
        "true_crime" => &["crime", "mystery", "case", "detective", "unsolved"],
        _ => &["user"],
    }
}

/// Generate one candidate username: prefix + 3-6 random digits.
pub fn candidate(niche_slug: &str, rng: &mut impl Rng) -> String {
    let pool = prefixes(niche_slug);
    let prefix = pool[rng.gen_range(0..pool.len())];
    let digits = rng.gen_range(3..=6u32);
    let mut name = String::from(prefix);
    for _ in 0..digits {
        name.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    name
}

/// Synthesize a username that is free on the platform, re-rolling on
/// collision.
pub async fn synthesize(
    db: &Database,
    platform: &str,
    niche_slug: &str,
) -> Result<String, DatabaseError> {
    // With 3-6 digits per prefix the space is large; a handful of rolls is
    // always enough in practice.
    for _ in 0..16 {
        let name = {
            let mut rng = rand::thread_rng();
            candidate(niche_slug, &mut rng)
        };
        if !db.username_taken(platform, &name).await? {
            return Ok(name);
        }
    }
    // Last resort: widen with extra digits
    let mut name = {
        let mut rng = rand::thread_rng();
        candidate(niche_slug, &mut rng)
    };
    for _ in 0..4 {
        let digit = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..10u8)
        };
        name.push(char::from(b'0' + digit));
    }
    Ok(name)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn candidates_use_niche_prefixes() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let name = candidate("personal_finance", &mut rng);
            assert!(
                ["money", "wealth", "finance", "cash", "invest"]
                    .iter()
                    .any(|p| name.starts_with(p)),
                "unexpected prefix: {name}"
            );
            let digits: String = name.chars().filter(char::is_ascii_digit).collect();
            assert!((3..=6).contains(&digits.len()), "digits: {name}");
        }
    }

    #[test]
    fn unknown_niche_falls_back() {
        let mut rng = rand::thread_rng();
        let name = candidate("underwater_basket_weaving", &mut rng);
        assert!(name.starts_with("user"));
    }

    #[tokio::test]
    async fn synthesize_avoids_collisions() {
        let db = Database::open_in_memory().await.unwrap();
        let niche = db.insert_niche("personal_finance", "Personal Finance", 1).await.unwrap();
        let first = synthesize(&db, "tiktok", "personal_finance").await.unwrap();
        db.insert_account("tiktok", &first, "e", "p", "t", &niche.id, None)
            .await
            .unwrap();

        let second = synthesize(&db, "tiktok", "personal_finance").await.unwrap();
        assert_ne!(first, second);
    }
}
