//! Human-readable invitation keys
//!
//! Three dictionary words joined by `-`, lower-cased, with possessives and
//! apostrophes removed so the key is safe in a URL path.

use rand::seq::IndexedRandom;

const WORDS_PER_KEY: usize = 3;

const WORDS: &[&str] = &[
    "Abbott's", "acorn", "admiral", "alder", "almanac", "amber", "anchor", "anvil", "apricot",
    "arbor", "archer", "aspen", "atlas", "autumn", "badger", "bagel", "banjo", "barley",
    "basalt", "beacon", "Becker's", "birch", "biscuit", "bison", "blossom", "bramble",
    "breeze", "brook", "buckle", "bumble", "cabin", "cactus", "camel", "candle", "canyon",
    "caramel", "cedar", "cello", "chalk", "cherry", "cider", "cinder", "clover", "cobalt",
    "comet", "copper", "coral", "cosmos", "cotton", "cricket", "crystal", "cypress", "dahlia",
    "daisy", "delta", "dew", "dingo", "dolphin", "dove", "drift", "dune", "eagle", "ember",
    "emerald", "falcon", "fern", "fiddle", "finch", "fjord", "flint", "Fletcher's", "forest",
    "fox", "frost", "galaxy", "garnet", "gazelle", "geyser", "ginger", "glacier", "granite",
    "grove", "gull", "harbor", "hazel", "heron", "hickory", "honey", "horizon", "iris",
    "island", "ivory", "jade", "jasper", "juniper", "kayak", "kelp", "kestrel", "kiwi",
    "lagoon", "lantern", "larch", "lark", "lava", "lemon", "lichen", "lilac", "linen",
    "lotus", "lunar", "magnet", "mango", "maple", "marble", "meadow", "mesa", "Miller's",
    "mint", "mist", "molten", "moss", "nectar", "nimbus", "nova", "oak", "oasis", "ocean",
    "olive", "onyx", "opal", "orchid", "osprey", "otter", "paddle", "pebble", "pepper",
    "pine", "plum", "polar", "poppy", "prairie", "quartz", "quill", "raven", "reef",
    "ridge", "river", "robin", "rowan", "saffron", "sage", "salmon", "sapphire", "sequoia",
    "shadow", "shore", "sierra", "silver", "sparrow", "spruce", "summit", "sunset", "swallow",
    "thistle", "thunder", "tide", "timber", "topaz", "tulip", "tundra", "valley", "velvet",
    "violet", "walnut", "willow", "wren", "yarrow", "zephyr",
];

/// Normalize a dictionary word into a key segment
pub fn sanitize_word(word: &str) -> String {
    word.replace("'s", "").replace('\'', "").to_lowercase()
}

/// Generate a fresh invitation key such as `maple-heron-quartz`
pub fn generate_invitation_key() -> String {
    let mut rng = rand::rng();
    WORDS
        .choose_multiple(&mut rng, WORDS_PER_KEY)
        .map(|word| sanitize_word(word))
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_possessive_and_case() {
        assert_eq!(sanitize_word("Abbott's"), "abbott");
        assert_eq!(sanitize_word("O'Neil"), "oneil");
        assert_eq!(sanitize_word("Maple"), "maple");
    }

    #[test]
    fn test_key_shape() {
        for _ in 0..100 {
            let key = generate_invitation_key();
            let parts: Vec<&str> = key.split('-').collect();
            assert_eq!(parts.len(), 3, "{key}");
            assert!(parts
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase())));
        }
    }
}
