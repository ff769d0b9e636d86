//! Codespace name sanitization and generation

use once_cell::sync::Lazy;
use regex::Regex;

static VALID_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static DASH_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());

const ADJECTIVES: &[&str] = &[
    "brave", "calm", "clever", "eager", "gentle", "happy", "jolly", "keen", "lively", "mighty",
    "nimble", "proud", "quiet", "rapid", "sunny", "swift", "tidy", "vivid", "witty", "zealous",
];

const NOUNS: &[&str] = &[
    "badger", "comet", "ember", "falcon", "glacier", "harbor", "island", "juniper", "kestrel",
    "lagoon", "meadow", "nebula", "otter", "pebble", "quartz", "raven", "summit", "tundra",
    "violet", "willow",
];

/// Lowercase, strip to `[a-z0-9-]`, collapse repeated dashes, and trim leading/trailing dashes.
///
/// Idempotent: `sanitize(sanitize(n)) == sanitize(n)` for all `n`, and the
/// result always matches `^[a-z0-9-]+$` unless the input was empty or had no
/// alphanumeric characters at all, in which case the result is empty.
pub fn sanitize(name: &str) -> String {
    let lower = name.to_lowercase();
    let replaced = NON_ALNUM.replace_all(&lower, "-");
    let collapsed = DASH_RUNS.replace_all(&replaced, "-");
    collapsed.trim_matches('-').to_string()
}

/// Whether `name` is a valid, nonempty sanitized codespace name.
pub fn is_valid(name: &str) -> bool {
    !name.is_empty() && VALID_NAME.is_match(name)
}

/// Generate a random `adjective-noun` name, used as the fallback when the
/// caller doesn't supply one (spec.md §4.7, `Create` step 1).
pub fn generate() -> String {
    let adjective = ADJECTIVES[fastrand::usize(..ADJECTIVES.len())];
    let noun = NOUNS[fastrand::usize(..NOUNS.len())];
    format!("{adjective}-{noun}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_strips() {
        assert_eq!(sanitize("My Repo!"), "my-repo");
        assert_eq!(sanitize("Hello_World.git"), "hello-world-git");
    }

    #[test]
    fn sanitize_collapses_dashes_and_trims() {
        assert_eq!(sanitize("--foo---bar--"), "foo-bar");
        assert_eq!(sanitize("___"), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["My Repo!", "already-sane", "A__B--C", "", "123"] {
            let once = sanitize(input);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn sanitize_output_matches_pattern_when_nonempty() {
        let s = sanitize("Hello World 123!!!");
        assert!(is_valid(&s), "{s} should match ^[a-z0-9-]+$");
    }

    #[test]
    fn generate_produces_valid_name() {
        for _ in 0..50 {
            let name = generate();
            assert!(is_valid(&name));
            assert!(name.contains('-'));
        }
    }
}
